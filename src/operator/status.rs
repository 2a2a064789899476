//! Projection of observed pods into `status.nodes`

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::operator::controller::Context;
use crate::operator::crd::{CommonWebUI, CommonWebUIStatus};
use crate::operator::resources::{
    owner_namespace, pod_selector, Outcome, APP_NAME,
};
use crate::operator::store::{api_resource, from_dynamic, to_dynamic};
use crate::operator::Error;

/// Reported until the first pod is observed
pub const DEFAULT_NODE: &str = "none";

pub fn default_nodes() -> Vec<String> {
    vec![DEFAULT_NODE.to_owned()]
}

async fn write_nodes(
    ctx: &Context,
    mut owner: CommonWebUI,
    nodes: Vec<String>,
) -> Result<CommonWebUI, Error> {
    owner.status = Some(CommonWebUIStatus { nodes });
    let stored = ctx
        .store
        .update_status(&api_resource::<CommonWebUI>(), &to_dynamic(&owner)?)
        .await?;
    Ok(from_dynamic(stored)?)
}

/// Seeds an empty status with the default before any child is reconciled.
pub async fn ensure_default(ctx: &Context, owner: CommonWebUI) -> Result<CommonWebUI, Error> {
    if !owner.nodes().is_empty() {
        return Ok(owner);
    }
    debug!(name = %owner.name_any(), "initializing status");
    write_nodes(ctx, owner, default_nodes()).await
}

/// Names of the owner's pods in listing order.
pub async fn observe(ctx: &Context, owner: &CommonWebUI) -> Result<Vec<String>, Error> {
    let namespace = owner_namespace(owner)?;
    let selector = pod_selector(APP_NAME, owner);
    let pods = ctx
        .store
        .list(&api_resource::<Pod>(), &namespace, &selector)
        .await?;

    let nodes: Vec<String> = pods
        .into_iter()
        .filter_map(|pod| pod.metadata.name)
        .collect();
    Ok(if nodes.is_empty() { default_nodes() } else { nodes })
}

/// Writes `nodes` through the status subresource unless they are already stored.
pub async fn persist_if_changed(
    ctx: &Context,
    owner: CommonWebUI,
    nodes: Vec<String>,
) -> Result<Outcome, Error> {
    if owner.nodes() == nodes.as_slice() {
        return Ok(Outcome::Unchanged);
    }
    info!(name = %owner.name_any(), nodes = ?nodes, "updating status");
    write_nodes(ctx, owner, nodes).await?;
    Ok(Outcome::Changed)
}
