use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVICE_NAME: &str = "common-web-ui";

#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "operators.ibm.com",
    version = "v1alpha1",
    kind = "CommonWebUI",
    plural = "commonwebuis",
    singular = "commonwebui",
    doc = "Custom resource representation of a common web UI deployment",
    status = "CommonWebUIStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.operatorVersion"}"#,
    namespaced
)]
pub struct CommonWebUISpec {
    #[serde(default)]
    pub operator_version: String,
    /// Zero is treated as a single replica
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub resources: ResourceSettings,
    #[serde(default, rename = "commonWebUIConfig")]
    pub common_web_ui_config: CommonWebUIConfig,
    #[serde(default, rename = "globalUIConfig")]
    pub global_ui_config: GlobalUIConfig,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSettings {
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub requests: Requests,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    /// CPU limit in millicores, e.g. `300m`
    #[serde(default)]
    pub cpu_limits: String,
    /// Memory limit in mebibytes, e.g. `256Mi`
    #[serde(default)]
    pub cpu_memory: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Requests {
    #[serde(default)]
    pub request_limits: String,
    #[serde(default)]
    pub request_memory: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommonWebUIConfig {
    #[serde(default)]
    pub image_registry: String,
    #[serde(default)]
    pub image_tag: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub landing_page: String,
    /// Fallbacks used when `spec.resources` leaves a value empty
    #[serde(default)]
    pub cpu_limits: String,
    #[serde(default)]
    pub cpu_memory: String,
    #[serde(default)]
    pub request_limits: String,
    #[serde(default)]
    pub request_memory: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GlobalUIConfig {
    #[serde(default)]
    pub cloud_pak_version: String,
    #[serde(default)]
    pub default_admin_user: String,
    #[serde(default)]
    pub default_auth: String,
    #[serde(default, rename = "enterpriseLDAP")]
    pub enterprise_ldap: String,
    #[serde(default, rename = "enterpriseSAML")]
    pub enterprise_saml: String,
    #[serde(default)]
    pub os_auth: String,
}

/// Written by the controller only.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default, JsonSchema)]
pub struct CommonWebUIStatus {
    #[serde(default)]
    pub nodes: Vec<String>,
}

impl CommonWebUI {
    pub fn service_name(&self) -> &str {
        match self.spec.common_web_ui_config.service_name.as_str() {
            "" => DEFAULT_SERVICE_NAME,
            name => name,
        }
    }

    pub fn replicas(&self) -> i32 {
        match self.spec.replicas {
            replicas if replicas <= 0 => 1,
            replicas => replicas,
        }
    }

    pub fn nodes(&self) -> &[String] {
        self.status
            .as_ref()
            .map(|status| status.nodes.as_slice())
            .unwrap_or_default()
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_spec() {
        let yaml = r#"
operatorVersion: "1.3.0"
replicas: 2
resources:
  limits:
    cpuLimits: 500m
    cpuMemory: 512Mi
commonWebUIConfig:
  serviceName: web-ui
  landingPage: /welcome
globalUIConfig:
  cloudPakVersion: "3.5"
  enterpriseLDAP: "true"
"#;
        let spec: CommonWebUISpec =
            serde_yaml::from_str(yaml).expect("test YAML should parse successfully");
        assert_eq!(spec.replicas, 2);
        assert_eq!(spec.resources.limits.cpu_limits, "500m");
        assert_eq!(spec.resources.requests.request_memory, "");
        assert_eq!(spec.common_web_ui_config.service_name, "web-ui");
        assert_eq!(spec.global_ui_config.enterprise_ldap, "true");
    }

    #[test]
    fn test_defaults() {
        let ui = CommonWebUI::new("ui", CommonWebUISpec::default());
        assert_eq!(ui.service_name(), DEFAULT_SERVICE_NAME);
        assert_eq!(ui.replicas(), 1);
        assert!(ui.nodes().is_empty());
        assert!(!ui.is_deleting());
    }
}
