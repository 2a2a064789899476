use crate::config::Config;
use crate::operator::crd::CommonWebUI;
use crate::operator::external::{console_link_resource, redis_sentinel_resource};
use crate::operator::resources::certificate::certificate_resource;
use crate::operator::resources::{OWNER_NAMESPACE_LABEL, OWNER_NAME_LABEL};
use crate::operator::retry::{compute_backoff, ErrorKind, RetryTracker};
use crate::operator::store::{KubeStore, ObjectStore};
use crate::operator::{Error, ReconcileResult, Reconciler};
use futures::{Future, StreamExt};
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Service},
    networking::v1::Ingress,
};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use kube::runtime::controller::{Action, Config as ControllerConfig, Error as ControllerError};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::runtime::{watcher::Config as WatcherConfig, Controller as KubeController};
use kube::{client::Client, discovery, Api, Resource, ResourceExt};
use std::future::IntoFuture;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct Controller {
    client: Client,
    context: Arc<Context>,
}

pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub config: Config,
    pub reconciler: Reconciler,
    pub retries: RetryTracker,
}

impl Context {
    pub fn new(store: Arc<dyn ObjectStore>, config: Config, reconciler: Reconciler) -> Self {
        Self {
            store,
            config,
            reconciler,
            retries: RetryTracker::new(),
        }
    }
}

impl Controller {
    pub fn new(client: Client, config: Config) -> Self {
        let store = Arc::new(KubeStore::new(client.clone()));
        let context = Context::new(store, config, Reconciler::standard());
        Self {
            client,
            context: Arc::new(context),
        }
    }

    pub fn get_context(&self) -> Arc<Context> {
        self.context.clone()
    }

    /// Api over the watched namespace, or the whole cluster when none is configured
    fn scoped<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match self.context.config.namespace.as_deref() {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    fn dynamic(&self, resource: &ApiResource, namespaced: bool) -> Api<DynamicObject> {
        match (namespaced, self.context.config.namespace.as_deref()) {
            (true, Some(namespace)) => {
                Api::namespaced_with(self.client.clone(), namespace, resource)
            }
            _ => Api::all_with(self.client.clone(), resource),
        }
    }

    /// Resolves a kind served by an optional CRD; `None` when it is not installed.
    async fn discover(&self, resource: &ApiResource) -> Option<ApiResource> {
        let gvk = GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind);
        match discovery::pinned_kind(&self.client, &gvk).await {
            Ok((resource, _capabilities)) => Some(resource),
            Err(err) => {
                warn!(kind = %gvk.kind, group = %gvk.group, error = %err, "kind is not served, skipping watch");
                None
            }
        }
    }

    async fn future(self) -> anyhow::Result<()> {
        info!(
            namespace = ?self.context.config.namespace,
            "Starting CommonWebUI controller"
        );

        let mut controller = KubeController::new(self.scoped::<CommonWebUI>(), WatcherConfig::default())
            .owns(self.scoped::<ConfigMap>(), WatcherConfig::default())
            .owns(self.scoped::<Deployment>(), WatcherConfig::default())
            .owns(self.scoped::<Service>(), WatcherConfig::default())
            .owns(self.scoped::<Ingress>(), WatcherConfig::default());

        if let Some(resource) = self.discover(&certificate_resource()).await {
            controller =
                controller.owns_with(self.dynamic(&resource, true), resource, WatcherConfig::default());
        }

        for (resource, namespaced) in [
            (console_link_resource(), false),
            (redis_sentinel_resource(), true),
        ] {
            if let Some(resource) = self.discover(&resource).await {
                controller = controller.watches_with(
                    self.dynamic(&resource, namespaced),
                    resource,
                    WatcherConfig::default(),
                    |object| owner_of(&object),
                );
            }
        }

        let context = self.context.clone();
        controller
            .with_config(ControllerConfig::default().concurrency(self.context.config.concurrency))
            .shutdown_on_signal()
            .run(reconcile, on_err, self.context.clone())
            .for_each(|result| {
                report(&context, result);
                futures::future::ready(())
            })
            .await;

        info!("CommonWebUI controller stopped");
        Ok(())
    }
}

impl IntoFuture for Controller {
    type Output = anyhow::Result<()>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.future())
    }
}

/// Maps a labelled external resource back to the CommonWebUI that created it.
pub fn owner_of(object: &DynamicObject) -> Option<ObjectRef<CommonWebUI>> {
    let labels = object.metadata.labels.as_ref()?;
    let name = labels.get(OWNER_NAME_LABEL)?;
    let namespace = labels.get(OWNER_NAMESPACE_LABEL)?;
    Some(ObjectRef::new(name).within(namespace))
}

fn retry_key_for(namespace: Option<&str>, name: &str) -> String {
    format!("{}/{}", namespace.unwrap_or_default(), name)
}

fn retry_key(generator: &CommonWebUI) -> String {
    retry_key_for(generator.namespace().as_deref(), &generator.name_any())
}

/// Logs the outcome of one reconciliation. An object that left the cache
/// before its retry fired no longer needs a retry counter.
pub fn report(
    ctx: &Context,
    result: Result<(ObjectRef<CommonWebUI>, Action), ControllerError<Error, watcher::Error>>,
) {
    match result {
        Ok((object, action)) => debug!(
            name = %object.name,
            namespace = ?object.namespace,
            ?action,
            "Successfully reconciled CommonWebUI"
        ),
        Err(ControllerError::ObjectNotFound(object)) => {
            ctx.retries
                .reset(&retry_key_for(object.namespace.as_deref(), &object.name));
            debug!(name = %object.name, namespace = ?object.namespace, "CommonWebUI is gone, dropping retry state");
        }
        Err(err) => warn!(error = %err, "Failed to reconcile CommonWebUI"),
    }
}

#[instrument(skip(generator, ctx), fields(name = %generator.name_any(), namespace = ?generator.namespace()))]
pub async fn reconcile(generator: Arc<CommonWebUI>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = generator
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(generator.name_any()))?;
    let name = generator.name_any();

    let result = ctx.reconciler.reconcile(&ctx, &namespace, &name).await?;
    ctx.retries.reset(&retry_key(&generator));

    Ok(match result {
        ReconcileResult::Done => Action::requeue(ctx.config.resync_after()),
        ReconcileResult::Requeue => Action::requeue(ctx.config.requeue_after()),
    })
}

pub fn on_err(generator: Arc<CommonWebUI>, error: &Error, ctx: Arc<Context>) -> Action {
    let kind = if error.is_transient() {
        ErrorKind::Transient
    } else {
        ErrorKind::Permanent
    };
    let attempt = ctx.retries.increment(&retry_key(&generator));

    warn!(
        name = %generator.name_any(),
        error = %error,
        attempt,
        error_kind = ?kind,
        "CommonWebUI reconciliation failed"
    );

    compute_backoff(attempt, kind)
}
