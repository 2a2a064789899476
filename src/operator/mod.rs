use crate::operator::document::DocumentError;
use crate::operator::ownership::BindError;
use crate::operator::store::StoreError;

pub mod auxiliary;
pub mod controller;
pub mod crd;
pub mod document;
pub mod external;
pub mod finalizer;
pub mod ownership;
pub mod reconciler;
pub mod resources;
pub mod retry;
pub mod status;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{Context, Controller};
pub use reconciler::{ReconcileResult, Reconciler};

/// All errors possible to occur during reconciliation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Any error originating from the object store
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
    #[error("failed to bind owner reference: {0}")]
    Bind(#[from] BindError),
    #[error("invalid document: {0}")]
    Document(#[from] DocumentError),
    #[error("dependency {0} is not ready")]
    DependencyNotReady(String),
    #[error("missing namespace for resource {0}")]
    MissingNamespace(String),
}

impl Error {
    /// Transient errors are worth retrying without waiting for a change of the object.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Store(_) | Error::DependencyNotReady(_))
    }
}
