//! Finalizer gates for externally tracked resources
//!
//! Each gate owns one finalizer token. While the CommonWebUI lives the token is
//! registered; once deletion is requested the tracked resource is deleted and
//! only then is the token removed. Gates never touch each other's tokens.

use kube::ResourceExt;
use tracing::{info, instrument, warn};

use crate::operator::controller::Context;
use crate::operator::crd::CommonWebUI;
use crate::operator::external::{ensure_external, ExternalResource};
use crate::operator::resources::Outcome;
use crate::operator::store::{api_resource, from_dynamic, to_dynamic, StoreError};
use crate::operator::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    NoFinalizer,
    FinalizerPresent,
    /// Deletion requested, token still held until the tracked resource is gone
    CleanupInFlight,
    FinalizerRemoved,
}

pub struct FinalizerGate {
    resource: Box<dyn ExternalResource>,
}

impl FinalizerGate {
    pub fn new(resource: impl ExternalResource + 'static) -> Self {
        Self {
            resource: Box::new(resource),
        }
    }

    pub fn token(&self) -> &'static str {
        self.resource.finalizer()
    }

    pub fn resource(&self) -> &dyn ExternalResource {
        self.resource.as_ref()
    }

    fn holds_token(&self, owner: &CommonWebUI) -> bool {
        owner.finalizers().iter().any(|token| token == self.token())
    }

    pub fn state(&self, owner: &CommonWebUI) -> FinalizerState {
        match (self.holds_token(owner), owner.is_deleting()) {
            (false, false) => FinalizerState::NoFinalizer,
            (true, false) => FinalizerState::FinalizerPresent,
            (true, true) => FinalizerState::CleanupInFlight,
            (false, true) => FinalizerState::FinalizerRemoved,
        }
    }

    /// Adds the token to a live owner. Returns the owner as stored afterwards.
    #[instrument(skip_all, fields(token = self.token(), name = %owner.name_any()))]
    pub async fn register(&self, ctx: &Context, owner: CommonWebUI) -> Result<CommonWebUI, Error> {
        if self.state(&owner) != FinalizerState::NoFinalizer {
            return Ok(owner);
        }

        let mut updated = owner;
        updated.finalizers_mut().push(self.token().to_owned());
        let stored = ctx
            .store
            .update(&api_resource::<CommonWebUI>(), &to_dynamic(&updated)?)
            .await?;
        info!("registered finalizer");
        Ok(from_dynamic(stored)?)
    }

    /// Ensures the tracked resource exists.
    pub async fn ensure(&self, ctx: &Context, owner: &CommonWebUI) -> Result<Outcome, Error> {
        ensure_external(ctx, owner, self.resource()).await
    }

    /// Deletes the tracked resource of a deleting owner and drops the token.
    ///
    /// A failed delete keeps the token so a later pass retries.
    #[instrument(skip_all, fields(token = self.token(), name = %owner.name_any()))]
    pub async fn release(&self, ctx: &Context, owner: CommonWebUI) -> Result<CommonWebUI, Error> {
        if self.state(&owner) != FinalizerState::CleanupInFlight {
            return Ok(owner);
        }

        let (namespace, name) = self.resource.target(&owner)?;
        match ctx
            .store
            .delete(&self.resource.kind(), &namespace, &name)
            .await
        {
            Ok(()) => info!(object = %name, "deleted external resource"),
            Err(StoreError::NotFound) => info!(object = %name, "external resource already gone"),
            Err(err) => {
                warn!(object = %name, error = %err, "failed to delete external resource, keeping finalizer");
                return Ok(owner);
            }
        }

        let mut updated = owner;
        let token = self.token();
        updated.finalizers_mut().retain(|finalizer| finalizer != token);
        let stored = ctx
            .store
            .update(&api_resource::<CommonWebUI>(), &to_dynamic(&updated)?)
            .await?;
        info!("removed finalizer");
        Ok(from_dynamic(stored)?)
    }
}
