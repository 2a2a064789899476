use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{ApiResource, DynamicObject, ObjectMeta};
use kube::ResourceExt;
use tracing::warn;

use super::{labels_for_metadata, owner_namespace, ChildResource, APP_NAME};
use crate::operator::controller::Context;
use crate::operator::crd::CommonWebUI;
use crate::operator::external::console_host;
use crate::operator::store::{api_resource, to_dynamic};
use crate::operator::Error;

pub const LOG4JS_CONFIG_MAP: &str = "common-web-ui-log4js";
pub const EXTENSIONS_CONFIG_MAP: &str = "common-web-ui-extensions";
pub const REDIS_CERTS_CONFIG_MAP: &str = "common-web-ui-redis-certs";

pub const DASHBOARD_PATH: &str = "/common-nav/dashboard";

const LOG4JS_CONFIG: &str = r#"{
  "appenders": {
    "console": { "type": "console", "layout": { "type": "pattern", "pattern": "[%d] [%p] [%c] %m" } }
  },
  "categories": {
    "default": { "appenders": ["console"], "level": "info" }
  }
}"#;

const ADD_ONS: &str = r#"[
  { "id": "administration-hub", "label": "Administration hub", "url": "/common-nav/dashboard" }
]"#;

const EXTENSIONS: &str = r#"{
  "header": { "logoUrl": "/common-nav/graphics/logo.svg", "homeUrl": "/common-nav/dashboard" }
}"#;

fn config_map(
    name: &str,
    owner: &CommonWebUI,
    data: BTreeMap<String, String>,
) -> Result<ConfigMap, Error> {
    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(owner_namespace(owner)?),
            labels: Some(labels_for_metadata(APP_NAME)),
            ..ObjectMeta::default()
        },
        data: Some(data),
        ..ConfigMap::default()
    })
}

/// Points the relative dashboard link at the console host.
pub fn absolute_dashboard_url(document: &str, host: &str) -> String {
    document.replacen(DASHBOARD_PATH, &format!("https://{host}{DASHBOARD_PATH}"), 1)
}

pub struct Log4js;

#[async_trait]
impl ChildResource for Log4js {
    fn kind(&self) -> ApiResource {
        api_resource::<ConfigMap>()
    }

    fn name(&self, _owner: &CommonWebUI) -> String {
        LOG4JS_CONFIG_MAP.to_owned()
    }

    async fn desired(&self, owner: &CommonWebUI, _ctx: &Context) -> Result<DynamicObject, Error> {
        let data = BTreeMap::from([("log4js.json".to_owned(), LOG4JS_CONFIG.to_owned())]);
        Ok(to_dynamic(&config_map(LOG4JS_CONFIG_MAP, owner, data)?)?)
    }
}

/// Header extensions linking back to the dashboard through the console route.
pub struct Extensions;

#[async_trait]
impl ChildResource for Extensions {
    fn kind(&self) -> ApiResource {
        api_resource::<ConfigMap>()
    }

    fn name(&self, _owner: &CommonWebUI) -> String {
        EXTENSIONS_CONFIG_MAP.to_owned()
    }

    async fn desired(&self, owner: &CommonWebUI, ctx: &Context) -> Result<DynamicObject, Error> {
        let namespace = owner_namespace(owner)?;
        let host = match console_host(ctx, &namespace).await {
            Ok(Some(host)) => Some(host),
            Ok(None) => {
                warn!(name = %owner.name_any(), "console route not found, keeping relative links");
                None
            }
            Err(err) => {
                warn!(name = %owner.name_any(), error = %err, "failed to read console route, keeping relative links");
                None
            }
        };

        let render = |document: &str| match &host {
            Some(host) => absolute_dashboard_url(document, host),
            None => document.to_owned(),
        };

        let data = BTreeMap::from([
            ("add-ons.json".to_owned(), render(ADD_ONS)),
            ("extensions".to_owned(), render(EXTENSIONS)),
        ]);
        Ok(to_dynamic(&config_map(EXTENSIONS_CONFIG_MAP, owner, data)?)?)
    }
}

/// Filled with the service CA bundle by the platform.
pub struct RedisCerts;

#[async_trait]
impl ChildResource for RedisCerts {
    fn kind(&self) -> ApiResource {
        api_resource::<ConfigMap>()
    }

    fn name(&self, _owner: &CommonWebUI) -> String {
        REDIS_CERTS_CONFIG_MAP.to_owned()
    }

    async fn desired(&self, owner: &CommonWebUI, _ctx: &Context) -> Result<DynamicObject, Error> {
        let mut config_map = config_map(REDIS_CERTS_CONFIG_MAP, owner, BTreeMap::new())?;
        config_map.metadata.annotations = Some(BTreeMap::from([(
            "service.beta.openshift.io/inject-cabundle".to_owned(),
            "true".to_owned(),
        )]));
        Ok(to_dynamic(&config_map)?)
    }
}
