//! Generic object store used by every reconciliation step
//!
//! All reads and writes of a pass go through [`ObjectStore`], which works on
//! schema-less [`DynamicObject`]s addressed by an [`ApiResource`]. Typed
//! objects are converted at the edges with [`to_dynamic`] and [`from_dynamic`].
//! An empty namespace addresses a cluster scoped object.

use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams, Resource,
};
use kube::core::{ErrorResponse, Selector};
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

pub const FIELD_MANAGER: &str = "commonui-controller";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
    #[error("object already exists")]
    AlreadyExists,
    #[error("object was modified concurrently")]
    Conflict,
    #[error("Kubernetes reported error: {0}")]
    Kube(#[source] kube::Error),
    #[error("invalid object: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(ErrorResponse { code: 404, .. }) => StoreError::NotFound,
            kube::Error::Api(ErrorResponse { code: 409, reason, .. })
                if reason == "AlreadyExists" =>
            {
                StoreError::AlreadyExists
            }
            kube::Error::Api(ErrorResponse { code: 409, .. }) => StoreError::Conflict,
            _ => StoreError::Kube(err),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(
        &self,
        kind: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError>;

    async fn create(
        &self,
        kind: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Replaces the object, failing with `Conflict` on a stale resource version.
    async fn update(
        &self,
        kind: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Replaces the status subresource only.
    async fn update_status(
        &self,
        kind: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    async fn delete(&self, kind: &ApiResource, namespace: &str, name: &str)
        -> Result<(), StoreError>;

    async fn list(
        &self,
        kind: &ApiResource,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>, StoreError>;
}

pub fn api_resource<K: Resource<DynamicType = ()>>() -> ApiResource {
    ApiResource::erase::<K>(&())
}

pub fn to_dynamic<K: Serialize>(object: &K) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

pub fn from_dynamic<K: DeserializeOwned>(object: DynamicObject) -> Result<K, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// [`ObjectStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        match namespace {
            "" => Api::all_with(self.client.clone(), kind),
            namespace => Api::namespaced_with(self.client.clone(), namespace, kind),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_owned()),
            ..PostParams::default()
        }
    }
}

fn namespace_of(object: &DynamicObject) -> &str {
    object.metadata.namespace.as_deref().unwrap_or_default()
}

fn name_of(object: &DynamicObject) -> &str {
    object.metadata.name.as_deref().unwrap_or_default()
}

#[async_trait]
impl ObjectStore for KubeStore {
    #[instrument(skip(self, kind), fields(kind = %kind.kind))]
    async fn get(
        &self,
        kind: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        Ok(self.api(kind, namespace).get_opt(name).await?)
    }

    #[instrument(skip(self, kind, object), fields(kind = %kind.kind, name = name_of(object)))]
    async fn create(
        &self,
        kind: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let created = self
            .api(kind, namespace_of(object))
            .create(&Self::post_params(), object)
            .await?;
        debug!("created object");
        Ok(created)
    }

    #[instrument(skip(self, kind, object), fields(kind = %kind.kind, name = name_of(object)))]
    async fn update(
        &self,
        kind: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        Ok(self
            .api(kind, namespace_of(object))
            .replace(name_of(object), &Self::post_params(), object)
            .await?)
    }

    #[instrument(skip(self, kind, object), fields(kind = %kind.kind, name = name_of(object)))]
    async fn update_status(
        &self,
        kind: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        Ok(self
            .api(kind, namespace_of(object))
            .replace_status(
                name_of(object),
                &Self::post_params(),
                serde_json::to_vec(object)?,
            )
            .await?)
    }

    #[instrument(skip(self, kind), fields(kind = %kind.kind))]
    async fn delete(
        &self,
        kind: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        self.api(kind, namespace)
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }

    #[instrument(skip(self, kind), fields(kind = %kind.kind))]
    async fn list(
        &self,
        kind: &ApiResource,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let params = ListParams::default().labels_from(selector);
        Ok(self.api(kind, namespace).list(&params).await?.items)
    }
}
