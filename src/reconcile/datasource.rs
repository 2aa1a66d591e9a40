//! DataSource reconcile body.
//!
//! Validates the referenced credentials, digests them, generates the
//! `"{name}-mcp"` workload/endpoint/registration trio and converges it.
//! The credential digest is stamped onto the workload so rotation forces a
//! semantic difference and a re-apply; the digest also lands in status for
//! observers.

use super::{KindReconciler, ReconcileContext};
use crate::apply::apply_owned_objects;
use crate::digest;
use crate::error::ReconcileError;
use crate::generator::StoreSiblingLookup;
use crate::manifest::{OwnedManifest, OwnerRef};
use crate::resource::condition::set_condition;
use crate::resource::PrimaryResource;
use crate::status::{connected_condition, ready_condition};
use crate::types::{ResourceKey, ResourceKind};
use async_trait::async_trait;
use tracing::info;

const DIGEST_LABEL: &str = "tend.dev/credentials-digest";

pub struct DataSourceReconciler;

#[async_trait]
impl KindReconciler for DataSourceReconciler {
    async fn reconcile(
        &self,
        cx: &ReconcileContext,
        key: &ResourceKey,
    ) -> Result<(), ReconcileError> {
        let Some(resource) = cx.store.get_resource(ResourceKind::DataSource, key)? else {
            // Deleted: owned objects cascade in the store; only the reverse
            // index needs clearing.
            cx.state
                .secret_index
                .remove_owner(ResourceKind::DataSource, key);
            info!(key = %key, "datasource was deleted");
            return Ok(());
        };

        cx.state.secret_index.set_references(
            ResourceKind::DataSource,
            key,
            resource
                .secret_refs()
                .iter()
                .map(|r| key.sibling(r.name.clone())),
        );

        let (secret_hash, outcome) = run_body(cx, &resource).await;
        write_status(cx, resource, secret_hash, outcome)
    }
}

/// Digest credentials and converge owned objects. Returns the digest (None
/// when unresolvable, so a previously recorded hash is never blanked) and the
/// pass outcome.
async fn run_body(
    cx: &ReconcileContext,
    resource: &PrimaryResource,
) -> (Option<String>, Result<(), ReconcileError>) {
    let key = resource.key().clone();

    let secret_hash = match digest::digest_secret_refs(
        cx.store.as_ref(),
        &key.namespace,
        &resource.secret_refs(),
    ) {
        Ok(hash) => hash,
        Err(err) => return (None, Err(err)),
    };

    let result = converge(cx, resource, &secret_hash).await;
    (Some(secret_hash), result)
}

async fn converge(
    cx: &ReconcileContext,
    resource: &PrimaryResource,
    secret_hash: &str,
) -> Result<(), ReconcileError> {
    let key = resource.key().clone();
    let generator = cx
        .generators
        .get(ResourceKind::DataSource)
        .ok_or_else(|| ReconcileError::Validation("no generator for DataSource".into()))?;

    let siblings = StoreSiblingLookup::new(cx.store.as_ref(), key.clone());
    let mut desired = generator.generate(resource, &siblings)?;

    // Stamp the digest onto workloads: rotated credentials change the label,
    // which re-applies the workload and restarts its instances.
    for manifest in &mut desired {
        if let OwnedManifest::Workload(workload) = manifest {
            workload
                .labels
                .insert(DIGEST_LABEL.to_string(), secret_hash.to_string());
        }
    }

    let owner = OwnerRef {
        kind: ResourceKind::DataSource,
        key: key.clone(),
        uid: resource.uid(),
    };
    apply_owned_objects(
        cx.store.as_ref(),
        &cx.state.config.conflict_retry,
        &owner,
        desired,
    )
    .await?;

    info!(key = %key, server = format!("{}-mcp", key.name), "reconciled datasource");
    Ok(())
}

/// Compute conditions and scalars, then persist only when something changed.
fn write_status(
    cx: &ReconcileContext,
    resource: PrimaryResource,
    secret_hash: Option<String>,
    outcome: Result<(), ReconcileError>,
) -> Result<(), ReconcileError> {
    let PrimaryResource::DataSource {
        metadata,
        spec,
        mut status,
    } = resource
    else {
        return Err(ReconcileError::Validation(
            "datasource status writer invoked for another kind".into(),
        ));
    };

    let err = outcome.as_ref().err();
    let generation = metadata.generation;

    let mut changed = set_condition(
        &mut status.conditions,
        connected_condition(generation, err),
    );
    changed |= set_condition(
        &mut status.conditions,
        ready_condition(generation, err, "Tool endpoint created successfully"),
    );

    if outcome.is_ok() {
        let server_name = format!("{}-mcp", metadata.key.name);
        changed |= status.generated_server != server_name;
        status.generated_server = server_name;
    }

    if let Some(secret_hash) = secret_hash {
        changed |= status.secret_hash != secret_hash;
        status.secret_hash = secret_hash;
    }

    if changed || status.observed_generation != generation {
        status.observed_generation = generation;
        cx.store.update_status(PrimaryResource::DataSource {
            metadata,
            spec,
            status,
        })?;
    }

    outcome
}
