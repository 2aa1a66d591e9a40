//! Agent reconcile body.
//!
//! Validates the referenced ModelConfig, converges the `"{name}-runtime"`
//! workload/endpoint pair, and caches the derived runtime configuration in
//! the catalog for the API surface. Readiness is derived from the runtime
//! workload's presence.

use super::{KindReconciler, ReconcileContext};
use crate::apply::apply_owned_objects;
use crate::catalog::AgentConfigRecord;
use crate::error::ReconcileError;
use crate::generator::StoreSiblingLookup;
use crate::manifest::OwnerRef;
use crate::resource::condition::{types as condition_types, set_condition, Condition, ConditionStatus};
use crate::resource::{AgentSpec, PrimaryResource};
use crate::status::accepted_condition;
use crate::types::{OwnedKind, ResourceKey, ResourceKind};
use async_trait::async_trait;
use tracing::info;

pub struct AgentReconciler;

#[async_trait]
impl KindReconciler for AgentReconciler {
    async fn reconcile(
        &self,
        cx: &ReconcileContext,
        key: &ResourceKey,
    ) -> Result<(), ReconcileError> {
        let Some(resource) = cx.store.get_resource(ResourceKind::Agent, key)? else {
            // Deleted: drop the cached derived record; owned objects cascade
            // in the store.
            cx.state.catalog.derived_configs.delete(&key.to_string())?;
            cx.state.secret_index.remove_owner(ResourceKind::Agent, key);
            info!(key = %key, "agent was deleted");
            return Ok(());
        };

        let outcome = run_body(cx, &resource).await;
        write_status(cx, resource, outcome)
    }
}

/// Resolve the ModelConfig an agent uses: its own reference, or the
/// engine-wide default.
fn model_config_key(
    cx: &ReconcileContext,
    agent_key: &ResourceKey,
    spec: &AgentSpec,
) -> Option<ResourceKey> {
    if !spec.model_config.is_empty() {
        return Some(agent_key.sibling(spec.model_config.clone()));
    }
    cx.state.config.default_model_config.clone()
}

async fn run_body(cx: &ReconcileContext, resource: &PrimaryResource) -> Result<(), ReconcileError> {
    let PrimaryResource::Agent { metadata, spec, .. } = resource else {
        return Err(ReconcileError::Validation(
            "agent body invoked for another kind".into(),
        ));
    };
    let key = &metadata.key;

    // The runtime cannot start without a model; a missing reference is a
    // dependency failure retried on the next relevant event.
    let model = match model_config_key(cx, key, spec) {
        Some(model_key) => {
            match cx.store.get_resource(ResourceKind::ModelConfig, &model_key)? {
                Some(PrimaryResource::ModelConfig { spec: model_spec, .. }) => model_spec.model,
                _ => {
                    return Err(ReconcileError::MissingDependency {
                        kind: ResourceKind::ModelConfig,
                        key: model_key,
                    })
                }
            }
        }
        None => {
            return Err(ReconcileError::Validation(
                "agent names no model config and no default is configured".into(),
            ))
        }
    };

    let generator = cx
        .generators
        .get(ResourceKind::Agent)
        .ok_or_else(|| ReconcileError::Validation("no generator for Agent".into()))?;
    let siblings = StoreSiblingLookup::new(cx.store.as_ref(), key.clone());
    let desired = generator.generate(resource, &siblings)?;

    let owner = OwnerRef {
        kind: ResourceKind::Agent,
        key: key.clone(),
        uid: metadata.uid,
    };
    apply_owned_objects(
        cx.store.as_ref(),
        &cx.state.config.conflict_retry,
        &owner,
        desired,
    )
    .await?;

    // Cache the derived runtime config for the API surface.
    cx.state.catalog.derived_configs.store(&AgentConfigRecord {
        id: key.to_string(),
        model,
        system_prompt: spec.system_prompt.clone(),
        tool_servers: spec
            .tool_servers
            .iter()
            .map(|name| key.sibling(name.clone()).to_string())
            .collect(),
    })?;

    info!(key = %key, "reconciled agent");
    Ok(())
}

fn write_status(
    cx: &ReconcileContext,
    resource: PrimaryResource,
    outcome: Result<(), ReconcileError>,
) -> Result<(), ReconcileError> {
    let PrimaryResource::Agent {
        metadata,
        spec,
        mut status,
    } = resource
    else {
        return Err(ReconcileError::Validation(
            "agent status writer invoked for another kind".into(),
        ));
    };

    let err = outcome.as_ref().err();
    let generation = metadata.generation;
    let workload_name = format!("{}-runtime", metadata.key.name);

    let mut changed = set_condition(&mut status.conditions, accepted_condition(generation, err));

    // Readiness reflects the runtime workload's presence in the store.
    let workload_key = ResourceKey::new(metadata.key.namespace.clone(), workload_name.clone());
    let ready = match cx.store.get_owned(OwnedKind::Workload, &workload_key) {
        Ok(Some(_)) => Condition::new(
            condition_types::READY,
            ConditionStatus::True,
            "WorkloadReady",
            "Runtime workload is present",
            generation,
        ),
        Ok(None) => Condition::new(
            condition_types::READY,
            ConditionStatus::Unknown,
            "WorkloadNotFound",
            "Runtime workload has not been created",
            generation,
        ),
        Err(store_err) => Condition::new(
            condition_types::READY,
            ConditionStatus::Unknown,
            "WorkloadNotFound",
            store_err.to_string(),
            generation,
        ),
    };
    changed |= set_condition(&mut status.conditions, ready);

    changed |= status.generated_workload != workload_name;
    status.generated_workload = workload_name;

    if changed || status.observed_generation != generation {
        status.observed_generation = generation;
        cx.store.update_status(PrimaryResource::Agent {
            metadata,
            spec,
            status,
        })?;
    }

    outcome
}
