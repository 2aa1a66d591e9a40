//! ModelConfig reconcile body.
//!
//! A ModelConfig owns no objects; reconciliation validates the referenced
//! secrets and records their digest so dependents can observe rotation.

use super::{KindReconciler, ReconcileContext};
use crate::digest;
use crate::error::ReconcileError;
use crate::resource::condition::{types as condition_types, set_condition, Condition, ConditionStatus};
use crate::resource::PrimaryResource;
use crate::types::{ResourceKey, ResourceKind};
use async_trait::async_trait;
use tracing::info;

pub struct ModelConfigReconciler;

#[async_trait]
impl KindReconciler for ModelConfigReconciler {
    async fn reconcile(
        &self,
        cx: &ReconcileContext,
        key: &ResourceKey,
    ) -> Result<(), ReconcileError> {
        let Some(resource) = cx.store.get_resource(ResourceKind::ModelConfig, key)? else {
            cx.state
                .secret_index
                .remove_owner(ResourceKind::ModelConfig, key);
            info!(key = %key, "model config was deleted");
            return Ok(());
        };

        cx.state.secret_index.set_references(
            ResourceKind::ModelConfig,
            key,
            resource
                .secret_refs()
                .iter()
                .map(|r| key.sibling(r.name.clone())),
        );

        let (secret_hash, outcome) = match digest::digest_secret_refs(
            cx.store.as_ref(),
            &key.namespace,
            &resource.secret_refs(),
        ) {
            Ok(hash) => (Some(hash), Ok(())),
            Err(err) => (None, Err(err)),
        };

        write_status(cx, resource, secret_hash, outcome)
    }
}

fn write_status(
    cx: &ReconcileContext,
    resource: PrimaryResource,
    secret_hash: Option<String>,
    outcome: Result<(), ReconcileError>,
) -> Result<(), ReconcileError> {
    let PrimaryResource::ModelConfig {
        metadata,
        spec,
        mut status,
    } = resource
    else {
        return Err(ReconcileError::Validation(
            "model config status writer invoked for another kind".into(),
        ));
    };

    let generation = metadata.generation;
    let condition = match outcome.as_ref().err() {
        Some(err) => Condition::new(
            condition_types::ACCEPTED,
            ConditionStatus::False,
            "ModelConfigReconcileFailed",
            err.to_string(),
            generation,
        ),
        None => Condition::new(
            condition_types::ACCEPTED,
            ConditionStatus::True,
            "ModelConfigReconciled",
            "",
            generation,
        ),
    };

    let mut changed = set_condition(&mut status.conditions, condition);
    if let Some(secret_hash) = secret_hash {
        changed |= status.secret_hash != secret_hash;
        status.secret_hash = secret_hash;
    }

    if changed || status.observed_generation != generation {
        status.observed_generation = generation;
        cx.store.update_status(PrimaryResource::ModelConfig {
            metadata,
            spec,
            status,
        })?;
    }

    outcome
}
