//! Custom resources tracked through finalizers instead of owner references
//!
//! A ConsoleLink is cluster scoped and a Redissentinel is managed by another
//! operator, so neither can be garbage collected with the CommonWebUI. They are
//! labelled with the owner's name and namespace so watch events map back to it.

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::operator::controller::Context;
use crate::operator::crd::CommonWebUI;
use crate::operator::document::Document;
use crate::operator::resources::configmap::DASHBOARD_PATH;
use crate::operator::resources::{owner_labels, owner_namespace, Outcome};
use crate::operator::store::StoreError;
use crate::operator::Error;

pub const CONSOLE_ROUTE: &str = "cp-console";

pub const CONSOLE_LINK_FINALIZER: &str = "commonui.operators.ibm.com";
pub const REDIS_SENTINEL_FINALIZER: &str = "commonui1.operators.ibm.com";

const CONSOLE_LINK_TEMPLATE: &str = r#"{
  "apiVersion": "console.openshift.io/v1",
  "kind": "ConsoleLink",
  "metadata": {"name": "admin-hub-console-link"},
  "spec": {
    "href": "",
    "location": "ApplicationMenu",
    "text": "Administration hub",
    "applicationMenu": {
      "section": "IBM Cloud Paks",
      "imageURL": "/common-nav/graphics/settings.svg"
    }
  }
}"#;

const REDIS_SENTINEL_TEMPLATE: &str = r#"{
  "apiVersion": "redis.databases.cloud.ibm.com/v1",
  "kind": "Redissentinel",
  "metadata": {"name": "common-web-ui-redis"},
  "spec": {
    "kind": "sentinel",
    "version": "5.0.9",
    "size": 3,
    "persistence": {"enabled": false},
    "tls": {"enabled": true, "certificateConfigMap": "common-web-ui-redis-certs"}
  }
}"#;

pub fn route_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("route.openshift.io", "v1", "Route"),
        "routes",
    )
}

pub fn console_link_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("console.openshift.io", "v1", "ConsoleLink"),
        "consolelinks",
    )
}

pub fn redis_sentinel_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("redis.databases.cloud.ibm.com", "v1", "Redissentinel"),
        "redissentinels",
    )
}

/// Host of the `cp-console` route in `namespace`, if the route exists and has one.
pub async fn console_host(ctx: &Context, namespace: &str) -> Result<Option<String>, StoreError> {
    let route = ctx
        .store
        .get(&route_resource(), namespace, CONSOLE_ROUTE)
        .await?;
    Ok(route
        .and_then(|route| route.data["spec"]["host"].as_str().map(str::to_owned))
        .filter(|host| !host.is_empty()))
}

#[async_trait]
pub trait ExternalResource: Send + Sync {
    /// Token guarding deletion of this resource family
    fn finalizer(&self) -> &'static str;

    fn kind(&self) -> ApiResource;

    /// Namespace (empty when cluster scoped) and name of the tracked object
    fn target(&self, owner: &CommonWebUI) -> Result<(String, String), Error>;

    async fn desired(&self, owner: &CommonWebUI, ctx: &Context) -> Result<DynamicObject, Error>;
}

/// Creates the tracked object when it is missing.
#[instrument(skip_all, fields(kind = %resource.kind().kind))]
pub async fn ensure_external(
    ctx: &Context,
    owner: &CommonWebUI,
    resource: &dyn ExternalResource,
) -> Result<Outcome, Error> {
    let kind = resource.kind();
    let (namespace, name) = resource.target(owner)?;

    if ctx.store.get(&kind, &namespace, &name).await?.is_some() {
        debug!(name = %name, "external resource already exists");
        return Ok(Outcome::Unchanged);
    }

    let object = resource.desired(owner, ctx).await?;
    match ctx.store.create(&kind, &object).await {
        Ok(_) => {
            info!(name = %name, "created external resource");
            Ok(Outcome::Changed)
        }
        Err(StoreError::AlreadyExists) => Ok(Outcome::Unchanged),
        Err(err) => Err(err.into()),
    }
}

fn from_template(template: &str, owner: &CommonWebUI) -> Result<Document, Error> {
    let mut document = Document::parse(template)?;
    document.set("metadata.labels", json!(owner_labels(owner)))?;
    Ok(document)
}

/// Administration hub entry in the OpenShift console application menu.
pub struct ConsoleLink;

#[async_trait]
impl ExternalResource for ConsoleLink {
    fn finalizer(&self) -> &'static str {
        CONSOLE_LINK_FINALIZER
    }

    fn kind(&self) -> ApiResource {
        console_link_resource()
    }

    fn target(&self, _owner: &CommonWebUI) -> Result<(String, String), Error> {
        let document = Document::parse(CONSOLE_LINK_TEMPLATE)?;
        Ok((String::new(), document.name()?.to_owned()))
    }

    async fn desired(&self, owner: &CommonWebUI, ctx: &Context) -> Result<DynamicObject, Error> {
        let namespace = owner_namespace(owner)?;
        let host = console_host(ctx, &namespace)
            .await?
            .ok_or_else(|| Error::DependencyNotReady(format!("route {namespace}/{CONSOLE_ROUTE}")))?;

        let mut document = from_template(CONSOLE_LINK_TEMPLATE, owner)?;
        document.set("spec.href", format!("https://{host}{DASHBOARD_PATH}"))?;
        Ok(document.into_object()?)
    }
}

pub struct RedisSentinel;

#[async_trait]
impl ExternalResource for RedisSentinel {
    fn finalizer(&self) -> &'static str {
        REDIS_SENTINEL_FINALIZER
    }

    fn kind(&self) -> ApiResource {
        redis_sentinel_resource()
    }

    fn target(&self, owner: &CommonWebUI) -> Result<(String, String), Error> {
        let document = Document::parse(REDIS_SENTINEL_TEMPLATE)?;
        Ok((owner_namespace(owner)?, document.name()?.to_owned()))
    }

    async fn desired(&self, owner: &CommonWebUI, _ctx: &Context) -> Result<DynamicObject, Error> {
        let mut document = from_template(REDIS_SENTINEL_TEMPLATE, owner)?;
        document.set("metadata.namespace", owner_namespace(owner)?)?;
        Ok(document.into_object()?)
    }
}
