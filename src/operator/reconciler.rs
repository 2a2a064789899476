//! Level-triggered reconciliation of a single CommonWebUI
//!
//! A pass re-reads the descriptor, creates missing children in a fixed order,
//! registers finalizers, runs the best-effort steps and finally projects the
//! pods into the status. A pass that created anything asks to be requeued and
//! leaves the status alone, so convergence finishes in the next pass.

use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::operator::auxiliary::{
    AuxiliaryStep, LegacyDaemonSet, NavConfigNamespaces, COMMON_WEB_UI_NAV_CONFIG,
    CP4I_NAV_CONFIG,
};
use crate::operator::controller::Context;
use crate::operator::crd::CommonWebUI;
use crate::operator::external::{ConsoleLink, RedisSentinel};
use crate::operator::finalizer::{FinalizerGate, FinalizerState};
use crate::operator::resources::certificate::UiCertificate;
use crate::operator::resources::configmap::{Extensions, Log4js, RedisCerts};
use crate::operator::resources::deployment::UiDeployment;
use crate::operator::resources::ingress::UiIngress;
use crate::operator::resources::service::UiService;
use crate::operator::resources::{ensure, ChildResource};
use crate::operator::status;
use crate::operator::store::{api_resource, from_dynamic};
use crate::operator::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileResult {
    /// Converged, nothing left to do until the next event
    Done,
    Requeue,
}

pub struct Reconciler {
    children: Vec<Box<dyn ChildResource>>,
    gates: Vec<FinalizerGate>,
    auxiliaries: Vec<Box<dyn AuxiliaryStep>>,
}

impl Reconciler {
    pub fn new(
        children: Vec<Box<dyn ChildResource>>,
        gates: Vec<FinalizerGate>,
        auxiliaries: Vec<Box<dyn AuxiliaryStep>>,
    ) -> Self {
        Self {
            children,
            gates,
            auxiliaries,
        }
    }

    /// Children, gates and steps managed for every CommonWebUI.
    pub fn standard() -> Self {
        Self::new(
            vec![
                Box::new(Log4js),
                Box::new(Extensions),
                Box::new(RedisCerts),
                Box::new(UiDeployment),
                Box::new(UiService),
                Box::new(UiIngress::Api),
                Box::new(UiIngress::Callback),
                Box::new(UiIngress::Nav),
                Box::new(UiCertificate),
            ],
            vec![
                FinalizerGate::new(ConsoleLink),
                FinalizerGate::new(RedisSentinel),
            ],
            vec![
                Box::new(NavConfigNamespaces {
                    nav_config: COMMON_WEB_UI_NAV_CONFIG,
                }),
                Box::new(NavConfigNamespaces {
                    nav_config: CP4I_NAV_CONFIG,
                }),
                Box::new(LegacyDaemonSet),
            ],
        )
    }

    pub fn gates(&self) -> &[FinalizerGate] {
        &self.gates
    }

    #[instrument(skip(self, ctx))]
    pub async fn reconcile(
        &self,
        ctx: &Context,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileResult, Error> {
        let Some(object) = ctx
            .store
            .get(&api_resource::<CommonWebUI>(), namespace, name)
            .await?
        else {
            debug!("CommonWebUI is gone, children are garbage collected");
            return Ok(ReconcileResult::Done);
        };
        let owner: CommonWebUI = from_dynamic(object)?;
        debug!(version = %owner.spec.operator_version, "reconciling CommonWebUI");

        if owner.is_deleting() {
            return self.finalize(ctx, owner).await;
        }

        let mut owner = status::ensure_default(ctx, owner).await?;

        let mut created = false;
        for child in &self.children {
            created |= ensure(ctx, &owner, child.as_ref()).await?.is_changed();
        }

        for gate in &self.gates {
            // The external resource is only created once its token is stored
            match gate.register(ctx, owner.clone()).await {
                Ok(updated) => owner = updated,
                Err(err) => {
                    warn!(token = gate.token(), error = %err, "failed to register finalizer, skipping external resource");
                    continue;
                }
            }
            if let Err(err) = gate.ensure(ctx, &owner).await {
                warn!(kind = %gate.resource().kind().kind, error = %err, "failed to reconcile external resource");
            }
        }

        for step in &self.auxiliaries {
            if let Err(err) = step.run(ctx, &owner).await {
                warn!(step = step.name(), error = %err, "auxiliary step failed");
            }
        }

        if created {
            info!("created children, requeueing");
            return Ok(ReconcileResult::Requeue);
        }

        let nodes = status::observe(ctx, &owner).await?;
        status::persist_if_changed(ctx, owner, nodes).await?;
        Ok(ReconcileResult::Done)
    }

    /// Releases every gate of a deleting owner; requeues until all tokens are gone.
    async fn finalize(&self, ctx: &Context, mut owner: CommonWebUI) -> Result<ReconcileResult, Error> {
        for gate in &self.gates {
            owner = gate.release(ctx, owner).await?;
        }

        let pending: Vec<&str> = self
            .gates
            .iter()
            .filter(|gate| gate.state(&owner) == FinalizerState::CleanupInFlight)
            .map(FinalizerGate::token)
            .collect();

        if pending.is_empty() {
            info!(name = %owner.name_any(), "finalizers released");
            Ok(ReconcileResult::Done)
        } else {
            debug!(pending = ?pending, "waiting for external resources to be deleted");
            Ok(ReconcileResult::Requeue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::crd::CommonWebUIStatus;
    use crate::operator::external::{
        console_link_resource, redis_sentinel_resource, route_resource, CONSOLE_LINK_FINALIZER,
        REDIS_SENTINEL_FINALIZER,
    };
    use crate::operator::resources::certificate::certificate_resource;
    use crate::operator::resources::{labels_for_pod, APP_NAME};
    use crate::operator::status::default_nodes;
    use crate::operator::store::{MockObjectStore, StoreError};
    use crate::operator::testing::{context, descriptor, MemoryStore, Op};
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
    use k8s_openapi::api::networking::v1::Ingress;
    use kube::api::{DynamicObject, ObjectMeta};
    use serde_json::json;
    use std::sync::Arc;

    fn route() -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "route.openshift.io/v1",
            "kind": "Route",
            "metadata": {"name": "cp-console", "namespace": "cs"},
            "spec": {"host": "cp.example.com"}
        }))
        .expect("route fixture should deserialize")
    }

    fn pod(name: &str, owner: &CommonWebUI) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("cs".to_string()),
                labels: Some(labels_for_pod(APP_NAME, owner)),
                ..ObjectMeta::default()
            },
            ..Pod::default()
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(&route_resource(), route());
        store.insert_typed(&descriptor());
        store
    }

    fn owner(store: &MemoryStore) -> CommonWebUI {
        store.typed("cs", "ui").expect("owner is stored")
    }

    #[tokio::test]
    async fn test_missing_descriptor_is_converged() {
        let store = MemoryStore::new();
        let ctx = context(Arc::new(store.clone()));

        let result = Reconciler::standard()
            .reconcile(&ctx, "cs", "ui")
            .await
            .expect("absent descriptor is not an error");
        assert_eq!(result, ReconcileResult::Done);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_first_pass_creates_children_and_requeues() {
        let store = seeded();
        // Running pods must not be projected while children are still being created
        store.insert_typed(&pod("p1", &descriptor()));
        store.insert_typed(&pod("p2", &descriptor()));
        let ctx = context(Arc::new(store.clone()));

        let result = Reconciler::standard()
            .reconcile(&ctx, "cs", "ui")
            .await
            .expect("first pass succeeds");
        assert_eq!(result, ReconcileResult::Requeue);

        assert_eq!(store.count(&api_resource::<ConfigMap>()), 3);
        assert_eq!(store.count(&api_resource::<Deployment>()), 1);
        assert_eq!(store.count(&api_resource::<Service>()), 1);
        assert_eq!(store.count(&api_resource::<Ingress>()), 3);
        assert_eq!(store.count(&certificate_resource()), 1);
        assert_eq!(store.count(&console_link_resource()), 1);
        assert_eq!(store.count(&redis_sentinel_resource()), 1);

        let owner = owner(&store);
        assert_eq!(owner.nodes(), default_nodes().as_slice());
        assert_eq!(
            owner.finalizers(),
            [
                CONSOLE_LINK_FINALIZER.to_string(),
                REDIS_SENTINEL_FINALIZER.to_string()
            ]
        );
        // Only the default status was written in the requeued pass
        assert_eq!(store.writes_of(Op::UpdateStatus), 1);
    }

    #[tokio::test]
    async fn test_every_child_has_one_controlling_owner() {
        let store = seeded();
        let ctx = context(Arc::new(store.clone()));
        let reconciler = Reconciler::standard();
        reconciler.reconcile(&ctx, "cs", "ui").await.expect("first pass");

        let owner = owner(&store);
        assert_eq!(reconciler.children.len(), 9);
        for child in &reconciler.children {
            let kind = child.kind();
            let name = child.name(&owner);
            let object = store
                .object(&kind, "cs", &name)
                .unwrap_or_else(|| panic!("{} {name} is stored", kind.kind));
            let references = object.owner_references();
            assert_eq!(references.len(), 1, "{} {name}", kind.kind);
            assert_eq!(references[0].controller, Some(true), "{} {name}", kind.kind);
            assert_eq!(references[0].uid, "owner-uid", "{} {name}", kind.kind);
            assert_eq!(references[0].kind, "CommonWebUI");
        }
    }

    #[tokio::test]
    async fn test_external_resources_wait_for_their_finalizer() {
        let store = seeded();
        store.fail_on(Op::Update, "CommonWebUI", 409, "Conflict");
        let ctx = context(Arc::new(store.clone()));
        let reconciler = Reconciler::standard();

        let result = reconciler
            .reconcile(&ctx, "cs", "ui")
            .await
            .expect("registration failures are logged");
        assert_eq!(result, ReconcileResult::Requeue);
        assert!(owner(&store).finalizers().is_empty());
        assert_eq!(store.count(&console_link_resource()), 0);
        assert_eq!(store.count(&redis_sentinel_resource()), 0);

        store.clear_failures();
        reconciler.reconcile(&ctx, "cs", "ui").await.expect("retry pass");
        assert_eq!(
            owner(&store).finalizers(),
            [
                CONSOLE_LINK_FINALIZER.to_string(),
                REDIS_SENTINEL_FINALIZER.to_string()
            ]
        );
        assert_eq!(store.count(&console_link_resource()), 1);
        assert_eq!(store.count(&redis_sentinel_resource()), 1);
    }

    #[tokio::test]
    async fn test_passes_converge_without_writes() {
        let store = seeded();
        let ctx = context(Arc::new(store.clone()));
        let reconciler = Reconciler::standard();

        reconciler.reconcile(&ctx, "cs", "ui").await.expect("first pass");
        store.clear_writes();

        let second = reconciler.reconcile(&ctx, "cs", "ui").await.expect("second pass");
        assert_eq!(second, ReconcileResult::Done);
        assert!(store.writes().is_empty(), "unexpected writes: {:?}", store.writes());

        let third = reconciler.reconcile(&ctx, "cs", "ui").await.expect("third pass");
        assert_eq!(third, ReconcileResult::Done);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_status_tracks_pods() {
        let store = seeded();
        let ctx = context(Arc::new(store.clone()));
        let reconciler = Reconciler::standard();
        reconciler.reconcile(&ctx, "cs", "ui").await.expect("first pass");

        let current = owner(&store);
        store.insert_typed(&pod("p1", &current));
        store.insert_typed(&pod("p2", &current));
        store.clear_writes();

        let result = reconciler.reconcile(&ctx, "cs", "ui").await.expect("status pass");
        assert_eq!(result, ReconcileResult::Done);
        assert_eq!(
            owner(&store).status,
            Some(CommonWebUIStatus {
                nodes: vec!["p1".to_string(), "p2".to_string()]
            })
        );
        assert_eq!(store.writes_of(Op::UpdateStatus), 1);
    }

    #[tokio::test]
    async fn test_external_failures_do_not_abort_the_pass() {
        let store = MemoryStore::new();
        store.insert_typed(&descriptor());
        store.fail_on(Op::Create, "Redissentinel", 500, "InternalError");
        let ctx = context(Arc::new(store.clone()));

        // No console route and a failing sentinel: both are logged only
        let result = Reconciler::standard()
            .reconcile(&ctx, "cs", "ui")
            .await
            .expect("pass succeeds");
        assert_eq!(result, ReconcileResult::Requeue);
        assert_eq!(store.count(&console_link_resource()), 0);
        assert_eq!(store.count(&redis_sentinel_resource()), 0);
        assert_eq!(store.count(&api_resource::<Deployment>()), 1);
    }

    #[tokio::test]
    async fn test_child_failure_aborts_before_status() {
        let store = seeded();
        store.fail_on(Op::Create, "Service", 500, "InternalError");
        let ctx = context(Arc::new(store.clone()));

        let result = Reconciler::standard().reconcile(&ctx, "cs", "ui").await;
        assert!(matches!(result, Err(Error::Store(StoreError::Kube(_)))));
        assert_eq!(store.count(&api_resource::<Deployment>()), 1);
        assert_eq!(store.count(&api_resource::<Ingress>()), 0);
        assert!(owner(&store).finalizers().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_returned() {
        let mut store = MockObjectStore::new();
        store
            .expect_get()
            .times(1)
            .returning(|_, _, _| Err(StoreError::Conflict));
        let ctx = context(Arc::new(store));

        let result = Reconciler::standard().reconcile(&ctx, "cs", "ui").await;
        assert!(matches!(result, Err(Error::Store(StoreError::Conflict))));
    }

    #[tokio::test]
    async fn test_deletion_releases_all_gates() {
        let store = seeded();
        let ctx = context(Arc::new(store.clone()));
        let reconciler = Reconciler::standard();
        reconciler.reconcile(&ctx, "cs", "ui").await.expect("first pass");
        store.mark_deleting(&api_resource::<CommonWebUI>(), "cs", "ui");
        store.clear_writes();

        let result = reconciler.reconcile(&ctx, "cs", "ui").await.expect("deletion pass");

        assert_eq!(result, ReconcileResult::Done);
        assert_eq!(store.count(&console_link_resource()), 0);
        assert_eq!(store.count(&redis_sentinel_resource()), 0);
        assert!(store.typed::<CommonWebUI>("cs", "ui").is_none());
        assert_eq!(store.writes_of(Op::Create), 0);
    }

    #[tokio::test]
    async fn test_deletion_requeues_while_cleanup_fails() {
        let store = seeded();
        let ctx = context(Arc::new(store.clone()));
        let reconciler = Reconciler::standard();
        reconciler.reconcile(&ctx, "cs", "ui").await.expect("first pass");
        store.mark_deleting(&api_resource::<CommonWebUI>(), "cs", "ui");
        store.fail_on(Op::Delete, "ConsoleLink", 500, "InternalError");

        let result = reconciler.reconcile(&ctx, "cs", "ui").await.expect("deletion pass");
        assert_eq!(result, ReconcileResult::Requeue);
        assert_eq!(owner(&store).finalizers(), [CONSOLE_LINK_FINALIZER.to_string()]);
        assert_eq!(store.count(&redis_sentinel_resource()), 0);

        store.clear_failures();
        let result = reconciler.reconcile(&ctx, "cs", "ui").await.expect("retry pass");
        assert_eq!(result, ReconcileResult::Done);
        assert!(store.typed::<CommonWebUI>("cs", "ui").is_none());
    }
}
