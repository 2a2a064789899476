use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, PodSpec,
    PodTemplateSpec, ResourceRequirements, SecretVolumeSource, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{ApiResource, DynamicObject, ObjectMeta};

use super::configmap::LOG4JS_CONFIG_MAP;
use super::{
    labels_for_metadata, labels_for_pod, labels_for_selector, owner_namespace, ChildResource,
    APP_NAME,
};
use crate::operator::controller::Context;
use crate::operator::crd::CommonWebUI;
use crate::operator::store::{api_resource, to_dynamic};
use crate::operator::Error;

pub const UI_PORT: i32 = 3000;

const DEFAULT_CPU_MILLICORES: i64 = 300;
const DEFAULT_MEMORY_MEBIBYTES: i64 = 256;

const LOG4JS_VOLUME: &str = "log4js";
const CLUSTER_CA_VOLUME: &str = "cluster-ca";
const UI_CERT_VOLUME: &str = "common-web-ui-certs";
const DASHBOARD_DATA_VOLUME: &str = "dashboard-data";

pub const UI_CERT_SECRET: &str = "common-web-ui-cert";
const CLUSTER_CA_SECRET: &str = "cs-ca-certificate-secret";

/// Composes a container from a base template by overriding named fields.
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    container: Container,
}

impl ContainerBuilder {
    pub fn new(base: Container) -> Self {
        Self { container: base }
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.container.image = Some(image.into());
        self
    }

    /// Replaces the variable called `name`, appending it when the base has none.
    pub fn with_env(mut self, name: &str, value: impl Into<String>) -> Self {
        let env = self.container.env.get_or_insert_with(Vec::new);
        let value = Some(value.into());
        match env.iter_mut().find(|var| var.name == name) {
            Some(var) => {
                var.value = value;
                var.value_from = None;
            }
            None => env.push(EnvVar {
                name: name.to_owned(),
                value,
                ..EnvVar::default()
            }),
        }
        self
    }

    pub fn resources(mut self, cpu: (i64, i64), memory: (i64, i64)) -> Self {
        let quantities = |cpu: i64, memory: i64| {
            BTreeMap::from([
                ("cpu".to_owned(), Quantity(format!("{cpu}m"))),
                ("memory".to_owned(), Quantity(format!("{memory}Mi"))),
            ])
        };
        self.container.resources = Some(ResourceRequirements {
            limits: Some(quantities(cpu.0, memory.0)),
            requests: Some(quantities(cpu.1, memory.1)),
            ..ResourceRequirements::default()
        });
        self
    }

    pub fn volume_mounts(mut self, mounts: Vec<VolumeMount>) -> Self {
        self.container.volume_mounts = Some(mounts);
        self
    }

    pub fn build(self) -> Container {
        self.container
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value: Some(value.to_owned()),
        ..EnvVar::default()
    }
}

/// Base UI container; per descriptor values are applied through [`ContainerBuilder`].
pub fn base_container() -> Container {
    Container {
        name: APP_NAME.to_owned(),
        image_pull_policy: Some("IfNotPresent".to_owned()),
        ports: Some(vec![ContainerPort {
            container_port: UI_PORT,
            name: Some("http".to_owned()),
            protocol: Some("TCP".to_owned()),
            ..ContainerPort::default()
        }]),
        env: Some(vec![
            env("NODE_ENV", "production"),
            env("PORT", &UI_PORT.to_string()),
            env("CLUSTER_NAME", "mycluster"),
            env("USE_HTTPS", "true"),
            env("LOG4JS_CONFIG", "/etc/config/log4js.json"),
            env("CLOUDPAK_VERSION", ""),
            env("DEFAULT_ADMIN_USER", ""),
            env("DEFAULT_AUTH", ""),
            env("ENTERPRISE_LDAP", ""),
            env("ENTERPRISE_SAML", ""),
            env("OSAUTH", ""),
            env("LANDING_PAGE", ""),
        ]),
        ..Container::default()
    }
}

/// Millicores from values such as `300m`; a bare number is read as millicores too.
pub fn millicores(value: &str, fallback: &str) -> i64 {
    parse_amount(value, fallback, "m").unwrap_or(DEFAULT_CPU_MILLICORES)
}

/// Mebibytes from values such as `256Mi`.
pub fn mebibytes(value: &str, fallback: &str) -> i64 {
    parse_amount(value, fallback, "Mi").unwrap_or(DEFAULT_MEMORY_MEBIBYTES)
}

fn parse_amount(value: &str, fallback: &str, suffix: &str) -> Option<i64> {
    let value = match value.trim() {
        "" => fallback.trim(),
        value => value,
    };
    value
        .strip_suffix(suffix)
        .unwrap_or(value)
        .parse()
        .ok()
        .filter(|amount| *amount > 0)
}

fn volume_mounts() -> Vec<VolumeMount> {
    [
        (LOG4JS_VOLUME, "/etc/config"),
        (CLUSTER_CA_VOLUME, "/opt/ibm/platform-header/certs"),
        (UI_CERT_VOLUME, "/certs/common-web-ui"),
        (DASHBOARD_DATA_VOLUME, "/tmp/dashboardData"),
    ]
    .into_iter()
    .map(|(name, mount_path)| VolumeMount {
        name: name.to_owned(),
        mount_path: mount_path.to_owned(),
        ..VolumeMount::default()
    })
    .collect()
}

fn volumes() -> Vec<Volume> {
    let secret = |name: &str, secret_name: &str| Volume {
        name: name.to_owned(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_owned()),
            ..SecretVolumeSource::default()
        }),
        ..Volume::default()
    };

    vec![
        Volume {
            name: LOG4JS_VOLUME.to_owned(),
            config_map: Some(ConfigMapVolumeSource {
                name: LOG4JS_CONFIG_MAP.to_owned(),
                ..ConfigMapVolumeSource::default()
            }),
            ..Volume::default()
        },
        secret(CLUSTER_CA_VOLUME, CLUSTER_CA_SECRET),
        secret(UI_CERT_VOLUME, UI_CERT_SECRET),
        Volume {
            name: DASHBOARD_DATA_VOLUME.to_owned(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Volume::default()
        },
    ]
}

pub fn ui_container(owner: &CommonWebUI, ctx: &Context) -> Container {
    let spec = &owner.spec;
    let ui = &spec.common_web_ui_config;
    let global = &spec.global_ui_config;
    let limits = &spec.resources.limits;
    let requests = &spec.resources.requests;

    ContainerBuilder::new(base_container())
        .image(
            ctx.config
                .ui_image(Some(ui.image_registry.as_str()), Some(ui.image_tag.as_str())),
        )
        .with_env("CLOUDPAK_VERSION", global.cloud_pak_version.as_str())
        .with_env("DEFAULT_ADMIN_USER", global.default_admin_user.as_str())
        .with_env("DEFAULT_AUTH", global.default_auth.as_str())
        .with_env("ENTERPRISE_LDAP", global.enterprise_ldap.as_str())
        .with_env("ENTERPRISE_SAML", global.enterprise_saml.as_str())
        .with_env("OSAUTH", global.os_auth.as_str())
        .with_env("LANDING_PAGE", ui.landing_page.as_str())
        .resources(
            (
                millicores(&limits.cpu_limits, &ui.cpu_limits),
                millicores(&requests.request_limits, &ui.request_limits),
            ),
            (
                mebibytes(&limits.cpu_memory, &ui.cpu_memory),
                mebibytes(&requests.request_memory, &ui.request_memory),
            ),
        )
        .volume_mounts(volume_mounts())
        .build()
}

pub struct UiDeployment;

#[async_trait]
impl ChildResource for UiDeployment {
    fn kind(&self) -> ApiResource {
        api_resource::<Deployment>()
    }

    fn name(&self, _owner: &CommonWebUI) -> String {
        APP_NAME.to_owned()
    }

    async fn desired(&self, owner: &CommonWebUI, ctx: &Context) -> Result<DynamicObject, Error> {
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some(APP_NAME.to_owned()),
                namespace: Some(owner_namespace(owner)?),
                labels: Some(labels_for_metadata(APP_NAME)),
                ..ObjectMeta::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(owner.replicas()),
                selector: LabelSelector {
                    match_labels: Some(labels_for_selector(APP_NAME, owner)),
                    ..LabelSelector::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels_for_pod(APP_NAME, owner)),
                        annotations: Some(BTreeMap::from([(
                            "productName".to_owned(),
                            "IBM Cloud Platform Common Services".to_owned(),
                        )])),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        service_account_name: Some(APP_NAME.to_owned()),
                        termination_grace_period_seconds: Some(60),
                        tolerations: Some(vec![
                            Toleration {
                                key: Some("dedicated".to_owned()),
                                operator: Some("Exists".to_owned()),
                                effect: Some("NoSchedule".to_owned()),
                                ..Toleration::default()
                            },
                            Toleration {
                                key: Some("CriticalAddonsOnly".to_owned()),
                                operator: Some("Exists".to_owned()),
                                ..Toleration::default()
                            },
                        ]),
                        volumes: Some(volumes()),
                        containers: vec![ui_container(owner, ctx)],
                        ..PodSpec::default()
                    }),
                },
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        };

        Ok(to_dynamic(&deployment)?)
    }
}
