//! Child resources owned by a CommonWebUI
//!
//! Every child follows the same create-if-absent protocol implemented by
//! [`ensure`]: look it up by its well-known name, and when it is missing build
//! the desired object, bind the owner and create it. Existing children are
//! never updated.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};
use kube::core::Selector;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use crate::operator::controller::Context;
use crate::operator::crd::CommonWebUI;
use crate::operator::ownership::bind;
use crate::operator::store::StoreError;
use crate::operator::Error;

pub mod certificate;
pub mod configmap;
pub mod deployment;
pub mod ingress;
pub mod service;

pub const MANAGED_BY: &str = "commonui-controller";
/// Name shared by the deployment, its pods and the legacy DaemonSet
pub const APP_NAME: &str = "common-web-ui";

pub const OWNER_NAME_LABEL: &str = "operators.ibm.com/commonwebui-name";
pub const OWNER_NAMESPACE_LABEL: &str = "operators.ibm.com/commonwebui-namespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Changed,
}

impl Outcome {
    pub fn is_changed(self) -> bool {
        self == Outcome::Changed
    }
}

/// A kind of object created once per owner and left alone afterwards.
#[async_trait]
pub trait ChildResource: Send + Sync {
    fn kind(&self) -> ApiResource;

    /// Well-known name of the child within the owner's namespace
    fn name(&self, owner: &CommonWebUI) -> String;

    async fn desired(&self, owner: &CommonWebUI, ctx: &Context) -> Result<DynamicObject, Error>;
}

pub fn owner_namespace(owner: &CommonWebUI) -> Result<String, Error> {
    owner
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(owner.name_any()))
}

#[instrument(skip_all, fields(kind = %child.kind().kind, name = %child.name(owner)))]
pub async fn ensure(
    ctx: &Context,
    owner: &CommonWebUI,
    child: &dyn ChildResource,
) -> Result<Outcome, Error> {
    let namespace = owner_namespace(owner)?;
    let kind = child.kind();
    let name = child.name(owner);

    if ctx.store.get(&kind, &namespace, &name).await?.is_some() {
        debug!("child already exists");
        return Ok(Outcome::Unchanged);
    }

    let mut object = child.desired(owner, ctx).await?;
    bind(owner, &mut object)?;

    match ctx.store.create(&kind, &object).await {
        Ok(_) => {
            info!(namespace = %namespace, "created child resource");
            Ok(Outcome::Changed)
        }
        Err(StoreError::AlreadyExists) => {
            debug!("child was created concurrently");
            Ok(Outcome::Unchanged)
        }
        Err(err) => Err(err.into()),
    }
}

pub fn labels_for_metadata(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_owned(), name.to_owned()),
        ("app.kubernetes.io/managed-by".to_owned(), MANAGED_BY.to_owned()),
    ])
}

/// Labels selecting the pods of `name` that belong to `owner`
pub fn labels_for_selector(name: &str, owner: &CommonWebUI) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("k8s-app".to_owned(), name.to_owned()),
        ("app.kubernetes.io/instance".to_owned(), owner.name_any()),
    ])
}

pub fn labels_for_pod(name: &str, owner: &CommonWebUI) -> BTreeMap<String, String> {
    let mut labels = labels_for_metadata(name);
    labels.extend(labels_for_selector(name, owner));
    labels
}

/// Labels that map an object without owner references back to its owner
pub fn owner_labels(owner: &CommonWebUI) -> BTreeMap<String, String> {
    let mut labels = labels_for_metadata(APP_NAME);
    labels.insert(OWNER_NAME_LABEL.to_owned(), owner.name_any());
    labels.insert(
        OWNER_NAMESPACE_LABEL.to_owned(),
        owner.namespace().unwrap_or_default(),
    );
    labels
}

/// Equality selector over [`labels_for_selector`]
pub fn pod_selector(name: &str, owner: &CommonWebUI) -> Selector {
    labels_for_selector(name, owner).into_iter().collect()
}
