//! Controller owner references for child resources
//!
//! Children carry exactly one controlling reference to the descriptor that
//! produced them, set before creation so the platform garbage collects them
//! together with their owner.

use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("owner {0} has no name or uid yet")]
    MissingIdentity(String),
    #[error("child in namespace {child} cannot be owned by an object in namespace {owner}")]
    NamespaceMismatch { owner: String, child: String },
}

/// Makes `owner` the single controlling owner of `child`.
///
/// A child without a namespace is placed in the owner's namespace.
pub fn bind<K>(owner: &K, child: &mut DynamicObject) -> Result<(), BindError>
where
    K: Resource<DynamicType = ()>,
{
    let reference = owner
        .controller_owner_ref(&())
        .ok_or_else(|| BindError::MissingIdentity(owner.name_any()))?;

    let owner_namespace = owner.namespace().unwrap_or_default();
    match child.metadata.namespace.as_deref() {
        None | Some("") => child.metadata.namespace = Some(owner_namespace),
        Some(namespace) if namespace == owner_namespace => {}
        Some(namespace) => {
            return Err(BindError::NamespaceMismatch {
                owner: owner_namespace,
                child: namespace.to_owned(),
            })
        }
    }

    child.metadata.owner_references = Some(vec![reference]);
    Ok(())
}

/// The controlling owner reference of an object, if any.
pub fn controller_of(object: &DynamicObject) -> Option<&str> {
    object
        .metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|reference| reference.controller == Some(true))
        .map(|reference| reference.uid.as_str())
}
