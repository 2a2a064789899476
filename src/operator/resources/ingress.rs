use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use kube::api::{ApiResource, DynamicObject, ObjectMeta};

use super::deployment::UI_PORT;
use super::{labels_for_metadata, owner_namespace, ChildResource, APP_NAME};
use crate::operator::controller::Context;
use crate::operator::crd::CommonWebUI;
use crate::operator::store::{api_resource, to_dynamic};
use crate::operator::Error;

const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/// The three routes the management ingress exposes for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiIngress {
    Api,
    Callback,
    Nav,
}

impl UiIngress {
    pub const ALL: [UiIngress; 3] = [UiIngress::Api, UiIngress::Callback, UiIngress::Nav];

    pub fn ingress_name(self) -> &'static str {
        match self {
            UiIngress::Api => "common-web-ui-api",
            UiIngress::Callback => "common-web-ui-callback",
            UiIngress::Nav => "common-web-ui",
        }
    }

    fn path(self) -> &'static str {
        match self {
            UiIngress::Api => "/common-nav/api",
            UiIngress::Callback => "/auth/liberty/callback",
            UiIngress::Nav => "/common-nav",
        }
    }

    fn annotations(self, ingress_class: &str) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::from([
            (INGRESS_CLASS_ANNOTATION.to_owned(), ingress_class.to_owned()),
            (
                "icp.management.ibm.com/secure-backends".to_owned(),
                "true".to_owned(),
            ),
        ]);
        match self {
            UiIngress::Api => {
                annotations.insert("icp.management.ibm.com/authz-type".to_owned(), "rbac".to_owned());
            }
            UiIngress::Callback => {
                annotations.insert(
                    "icp.management.ibm.com/upstream-uri".to_owned(),
                    "/auth/liberty/callback".to_owned(),
                );
            }
            UiIngress::Nav => {
                annotations.insert(
                    "icp.management.ibm.com/configuration-snippet".to_owned(),
                    "add_header Cache-Control \"no-store\";".to_owned(),
                );
            }
        }
        annotations
    }
}

#[async_trait]
impl ChildResource for UiIngress {
    fn kind(&self) -> ApiResource {
        api_resource::<Ingress>()
    }

    fn name(&self, _owner: &CommonWebUI) -> String {
        self.ingress_name().to_owned()
    }

    async fn desired(&self, owner: &CommonWebUI, ctx: &Context) -> Result<DynamicObject, Error> {
        let backend = IngressBackend {
            service: Some(IngressServiceBackend {
                name: owner.service_name().to_owned(),
                port: Some(ServiceBackendPort {
                    number: Some(UI_PORT),
                    ..ServiceBackendPort::default()
                }),
            }),
            ..IngressBackend::default()
        };

        let ingress = Ingress {
            metadata: ObjectMeta {
                name: Some(self.ingress_name().to_owned()),
                namespace: Some(owner_namespace(owner)?),
                labels: Some(labels_for_metadata(APP_NAME)),
                annotations: Some(self.annotations(&ctx.config.ingress_class)),
                ..ObjectMeta::default()
            },
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some(self.path().to_owned()),
                            path_type: "ImplementationSpecific".to_owned(),
                            backend,
                        }],
                    }),
                    ..IngressRule::default()
                }]),
                ..IngressSpec::default()
            }),
            ..Ingress::default()
        };

        Ok(to_dynamic(&ingress)?)
    }
}
