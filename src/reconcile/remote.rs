//! RemoteServer reconcile body.
//!
//! Refreshes the endpoint's catalog record, resolves credential headers, and
//! runs capability discovery. On success the capability snapshot is replaced
//! whole; on failure the last-known-good snapshot is read back from the
//! catalog so a transient outage never empties the advertised capability
//! set. Staleness is preferred over emptiness.

use super::{KindReconciler, ReconcileContext};
use crate::catalog::ServerRecord;
use crate::discovery::DiscoveryClient;
use crate::error::ReconcileError;
use crate::resource::condition::{types as condition_types, set_condition, Condition, ConditionStatus};
use crate::resource::remote::DiscoveredCapability;
use crate::resource::PrimaryResource;
use crate::types::{ResourceKey, ResourceKind};
use async_trait::async_trait;
use tracing::{info, warn};

pub struct RemoteServerReconciler;

#[async_trait]
impl KindReconciler for RemoteServerReconciler {
    async fn reconcile(
        &self,
        cx: &ReconcileContext,
        key: &ResourceKey,
    ) -> Result<(), ReconcileError> {
        let Some(resource) = cx.store.get_resource(ResourceKind::RemoteServer, key)? else {
            // Deleted: drop the catalog record and its capability snapshot.
            cx.state
                .catalog
                .capability_index
                .delete_server(&key.to_string())?;
            cx.state
                .secret_index
                .remove_owner(ResourceKind::RemoteServer, key);
            info!(key = %key, "remote server was deleted");
            return Ok(());
        };

        cx.state.secret_index.set_references(
            ResourceKind::RemoteServer,
            key,
            resource
                .secret_refs()
                .iter()
                .map(|r| key.sibling(r.name.clone())),
        );

        let (capabilities, outcome) = run_body(cx, &resource).await;
        write_status(cx, resource, capabilities, outcome)
    }
}

/// Discover capabilities, falling back to the catalog snapshot on failure.
/// Returns None when neither discovery nor the fallback produced a list, in
/// which case the status snapshot is left untouched.
async fn run_body(
    cx: &ReconcileContext,
    resource: &PrimaryResource,
) -> (Option<Vec<DiscoveredCapability>>, Result<(), ReconcileError>) {
    let PrimaryResource::RemoteServer { metadata, spec, .. } = resource else {
        return (
            None,
            Err(ReconcileError::Validation(
                "remote server body invoked for another kind".into(),
            )),
        );
    };
    let key = &metadata.key;
    let id = key.to_string();

    // Every attempt, success or failure, refreshes the endpoint record.
    if let Err(err) = cx.state.catalog.capability_index.upsert_server(&ServerRecord {
        id: id.clone(),
        description: spec.description.clone(),
        protocol: spec.protocol,
        url: spec.url.clone(),
    }) {
        return (None, Err(err.into()));
    }

    // Resolve credential headers; the values pass through to the transport
    // and are never persisted.
    let mut headers = Vec::with_capacity(spec.headers_from.len());
    for header in &spec.headers_from {
        let secret_key = key.sibling(header.secret_ref.name.clone());
        let secret = match cx.store.get_secret(&secret_key) {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                return (
                    None,
                    Err(ReconcileError::MissingSecret {
                        secret: secret_key,
                        detail: "not found".into(),
                    }),
                )
            }
            Err(err) => return (None, Err(err.into())),
        };
        let Some(value) = secret.data.get(&header.secret_ref.key) else {
            return (
                None,
                Err(ReconcileError::MissingSecret {
                    secret: secret_key,
                    detail: format!("key {:?} not found", header.secret_ref.key),
                }),
            );
        };
        headers.push((
            header.header.clone(),
            String::from_utf8_lossy(value).to_string(),
        ));
    }

    // The spec may tighten or loosen the engine-wide RPC bound.
    let mut discovery_config = cx.state.config.discovery.clone();
    if let Some(secs) = spec.timeout_secs {
        discovery_config.rpc_timeout_secs = secs;
    }

    let transport = cx.state.transports.create(spec, headers);
    let client = DiscoveryClient::new(transport, cx.state.client_info(), &discovery_config);

    match client.discover().await {
        Ok(capabilities) => {
            // Atomically replace the last-known-good snapshot.
            if let Err(err) = cx
                .state
                .catalog
                .capability_index
                .replace_capabilities(&id, &capabilities)
            {
                return (Some(capabilities), Err(err.into()));
            }
            info!(key = %key, count = capabilities.len(), "discovered capabilities");
            (Some(capabilities), Ok(()))
        }
        Err(discovery_err) => {
            warn!(key = %key, error = %discovery_err, "capability discovery failed, using last known snapshot");
            let err = ReconcileError::Transport(discovery_err);
            match cx.state.catalog.capability_index.capabilities_for(&id) {
                Ok(snapshot) => (snapshot, Err(err)),
                Err(read_err) => (
                    None,
                    Err(ReconcileError::join(vec![err, read_err.into()])
                        .unwrap_or(ReconcileError::Validation("discovery failed".into()))),
                ),
            }
        }
    }
}

fn write_status(
    cx: &ReconcileContext,
    resource: PrimaryResource,
    capabilities: Option<Vec<DiscoveredCapability>>,
    outcome: Result<(), ReconcileError>,
) -> Result<(), ReconcileError> {
    let PrimaryResource::RemoteServer {
        metadata,
        spec,
        mut status,
    } = resource
    else {
        return Err(ReconcileError::Validation(
            "remote server status writer invoked for another kind".into(),
        ));
    };

    let err = outcome.as_ref().err();
    let generation = metadata.generation;

    let connected = match err {
        Some(e) if e.is_credential() => Condition::new(
            condition_types::CONNECTED,
            ConditionStatus::False,
            "CredentialsError",
            e.to_string(),
            generation,
        ),
        Some(e) => Condition::new(
            condition_types::CONNECTED,
            ConditionStatus::False,
            "DiscoveryFailed",
            e.to_string(),
            generation,
        ),
        None => Condition::new(
            condition_types::CONNECTED,
            ConditionStatus::True,
            "Connected",
            "Capability discovery succeeded",
            generation,
        ),
    };
    let mut changed = set_condition(&mut status.conditions, connected);

    let ready = match err {
        Some(e) => Condition::new(
            condition_types::READY,
            ConditionStatus::False,
            "ReconcileFailed",
            e.to_string(),
            generation,
        ),
        None => Condition::new(
            condition_types::READY,
            ConditionStatus::True,
            "Ready",
            "Endpoint registered and capabilities discovered",
            generation,
        ),
    };
    changed |= set_condition(&mut status.conditions, ready);

    // A None snapshot (discovery failed, nothing in the catalog) leaves the
    // stored list untouched: stale beats empty.
    if let Some(capabilities) = capabilities {
        if status.discovered_capabilities != capabilities {
            status.discovered_capabilities = capabilities;
            changed = true;
        }
    }

    if changed || status.observed_generation != generation {
        status.observed_generation = generation;
        cx.store.update_status(PrimaryResource::RemoteServer {
            metadata,
            spec,
            status,
        })?;
    }

    outcome
}
