//! Best-effort steps run after the children of a pass
//!
//! Failures here are logged by the driver and never abort a pass, and changes
//! made here never trigger a requeue.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::api::ApiResource;
use kube::core::GroupVersionKind;
use serde_json::Value;
use tracing::info;

use crate::operator::controller::Context;
use crate::operator::crd::CommonWebUI;
use crate::operator::document::Document;
use crate::operator::resources::{owner_namespace, Outcome, APP_NAME};
use crate::operator::store::{api_resource, StoreError};
use crate::operator::Error;

pub const COMMON_WEB_UI_NAV_CONFIG: &str = "common-web-ui-config";
pub const CP4I_NAV_CONFIG: &str = "cp4i-nav-config";

#[async_trait]
pub trait AuxiliaryStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &Context, owner: &CommonWebUI) -> Result<Outcome, Error>;
}

pub fn nav_config_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("foundation.ibm.com", "v1", "NavConfig"),
        "navconfigs",
    )
}

/// Points the namespaced entries of a NavConfig at the owner's namespace.
pub struct NavConfigNamespaces {
    pub nav_config: &'static str,
}

/// Rewrites every non-empty `namespace` of `spec.navItems`, returning whether anything changed.
pub fn retarget_nav_items(document: &mut Document, namespace: &str) -> bool {
    let Some(Value::Array(items)) = document.get_mut("spec.navItems") else {
        return false;
    };

    let mut changed = false;
    for item in items.iter_mut().filter_map(Value::as_object_mut) {
        let stale = matches!(
            item.get("namespace").and_then(Value::as_str),
            Some(current) if !current.is_empty() && current != namespace
        );
        if stale {
            item.insert("namespace".to_owned(), Value::from(namespace));
            changed = true;
        }
    }
    changed
}

#[async_trait]
impl AuxiliaryStep for NavConfigNamespaces {
    fn name(&self) -> &'static str {
        self.nav_config
    }

    async fn run(&self, ctx: &Context, owner: &CommonWebUI) -> Result<Outcome, Error> {
        let kind = nav_config_resource();
        let namespace = owner_namespace(owner)?;
        let Some(object) = ctx.store.get(&kind, &namespace, self.nav_config).await? else {
            return Ok(Outcome::Unchanged);
        };

        let mut document = Document::from_object(&object)?;
        if !retarget_nav_items(&mut document, &namespace) {
            return Ok(Outcome::Unchanged);
        }

        ctx.store.update(&kind, &document.into_object()?).await?;
        info!(nav_config = self.nav_config, namespace = %namespace, "updated nav item namespaces");
        Ok(Outcome::Changed)
    }
}

/// Removes the DaemonSet that served the UI before it became a Deployment.
pub struct LegacyDaemonSet;

#[async_trait]
impl AuxiliaryStep for LegacyDaemonSet {
    fn name(&self) -> &'static str {
        "legacy-daemonset"
    }

    async fn run(&self, ctx: &Context, _owner: &CommonWebUI) -> Result<Outcome, Error> {
        if !ctx.config.remove_legacy_daemonset {
            return Ok(Outcome::Unchanged);
        }

        let kind = api_resource::<DaemonSet>();
        let namespace = ctx.config.legacy_namespace.as_str();
        if ctx.store.get(&kind, namespace, APP_NAME).await?.is_none() {
            return Ok(Outcome::Unchanged);
        }

        match ctx.store.delete(&kind, namespace, APP_NAME).await {
            Ok(()) => {
                info!(namespace = %namespace, "deleted legacy DaemonSet");
                Ok(Outcome::Changed)
            }
            Err(StoreError::NotFound) => Ok(Outcome::Unchanged),
            Err(err) => Err(err.into()),
        }
    }
}
