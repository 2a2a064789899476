//! Command line and environment configuration for the controller

use clap::{Parser, ValueEnum};
use std::time::Duration;

pub const DEFAULT_IMAGE_REGISTRY: &str = "quay.io/opencloudio";
pub const DEFAULT_IMAGE_NAME: &str = "common-web-ui";
pub const DEFAULT_IMAGE_TAG: &str = "1.3.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "controller", about = "Reconciles CommonWebUI resources")]
pub struct Config {
    /// Namespace to watch, all namespaces when unset
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Full image reference, overrides registry, name and tag
    #[arg(long, env = "COMMON_WEB_UI_IMAGE")]
    pub image: Option<String>,

    #[arg(long, env = "IMAGE_REGISTRY", default_value = DEFAULT_IMAGE_REGISTRY)]
    pub image_registry: String,

    #[arg(long, env = "IMAGE_TAG", default_value = DEFAULT_IMAGE_TAG)]
    pub image_tag: String,

    /// Ingress class annotation put on every managed ingress
    #[arg(long, env = "INGRESS_CLASS", default_value = "ibm-icp-management")]
    pub ingress_class: String,

    /// Delay before the follow-up pass after children were created
    #[arg(long, default_value_t = 1)]
    pub requeue_secs: u64,

    /// Periodic resync for converged resources
    #[arg(long, default_value_t = 60)]
    pub resync_secs: u64,

    /// Maximum number of descriptors reconciled in parallel
    #[arg(long, default_value_t = 4)]
    pub concurrency: u16,

    /// Namespace holding the DaemonSet used by releases before 1.3
    #[arg(long, default_value = "kube-system")]
    pub legacy_namespace: String,

    #[arg(
        long,
        env = "REMOVE_LEGACY_DAEMONSET",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub remove_legacy_daemonset: bool,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }

    pub fn resync_after(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }

    /// Image for the UI container.
    pub fn ui_image(&self, registry: Option<&str>, tag: Option<&str>) -> String {
        if let Some(image) = self.image.as_deref().filter(|image| !image.is_empty()) {
            return image.to_owned();
        }

        let registry = registry
            .filter(|registry| !registry.is_empty())
            .unwrap_or(&self.image_registry);
        let tag = tag.filter(|tag| !tag.is_empty()).unwrap_or(&self.image_tag);

        format!(
            "{}/{}:{}",
            registry.trim_end_matches('/'),
            DEFAULT_IMAGE_NAME,
            tag
        )
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    // Every flag with an environment fallback is given explicitly
    let mut config = Config::parse_from([
        "controller",
        "--image-registry",
        "registry.test",
        "--image-tag",
        "9.9.9",
        "--ingress-class",
        "ibm-icp-management",
        "--remove-legacy-daemonset",
        "true",
        "--log-format",
        "text",
    ]);
    config.namespace = None;
    config.image = None;
    config
}
