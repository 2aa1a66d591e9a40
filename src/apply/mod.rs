//! Generic desired-vs-actual apply engine.
//!
//! Takes the generator's desired manifest set and the currently-owned objects
//! and converges them: create what is missing, update what differs
//! semantically, prune what is no longer desired. Every write runs inside a
//! bounded retry-on-conflict loop; pruning failures are collected so one bad
//! deletion does not block the rest.

use crate::config::ConflictRetry;
use crate::error::{ReconcileError, StoreError};
use crate::manifest::{OwnedManifest, OwnerRef};
use crate::store::{OwnedObject, ResourceStore};
use crate::types::{OwnedKind, ResourceKey};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Run `op` until it succeeds or fails with a non-conflict error, retrying
/// optimistic-concurrency collisions up to the configured budget with
/// exponential backoff. The read-modify-write cycle belongs inside `op` so
/// every attempt starts from a fresh read.
pub async fn retry_on_conflict<T, F>(retry: &ConflictRetry, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt: u32 = 0;
    loop {
        match op() {
            Err(err) if err.is_conflict() => {
                attempt += 1;
                if attempt >= retry.attempts {
                    return Err(err);
                }
                debug!(attempt, "write conflicted, retrying");
                tokio::time::sleep(retry.delay_for(attempt)).await;
            }
            other => return other,
        }
    }
}

/// Converge the owner's children toward `desired`.
///
/// Matching is by (kind, key). Store-assigned fields on existing objects are
/// carried forward before comparison so they are never blanked by an update.
/// When every desired manifest applied cleanly, unmatched children are
/// orphans and are deleted; their failures are joined into one aggregate
/// error.
pub async fn apply_owned_objects(
    store: &dyn ResourceStore,
    retry: &ConflictRetry,
    owner: &OwnerRef,
    desired: Vec<OwnedManifest>,
) -> Result<(), ReconcileError> {
    let mut unmatched: HashMap<(OwnedKind, ResourceKey), OwnedObject> = store
        .list_owned_by(owner.uid)?
        .into_iter()
        .map(|obj| ((obj.kind(), obj.key()), obj))
        .collect();

    let mut errs = Vec::new();
    for manifest in desired {
        let kind = manifest.kind();
        let key = ResourceKey::new(owner.key.namespace.clone(), manifest.name());
        match apply_one(store, retry, owner, &manifest).await {
            Ok(()) => {
                // Still managed; not an orphan.
                unmatched.remove(&(kind, key));
            }
            Err(err) => {
                warn!(object = %key, kind = %kind, error = %err, "failed to configure desired object");
                errs.push(err);
            }
        }
    }

    // A failed apply leaves its object unmatched; pruning now could delete a
    // child that is still desired. Surface the apply errors instead.
    if let Some(err) = ReconcileError::join(errs) {
        return Err(err);
    }

    prune_owned_objects(store, unmatched.into_values()).await
}

async fn apply_one(
    store: &dyn ResourceStore,
    retry: &ConflictRetry,
    owner: &OwnerRef,
    manifest: &OwnedManifest,
) -> Result<(), ReconcileError> {
    let kind = manifest.kind();
    let key = ResourceKey::new(owner.key.namespace.clone(), manifest.name());

    let result = retry_on_conflict(retry, || {
        match store.get_owned(kind, &key)? {
            None => {
                store.create_owned(manifest.clone(), owner.clone())?;
                Ok(())
            }
            Some(existing) => {
                let mut next = manifest.clone();
                next.carry_forward(&existing.manifest);
                if next.semantic_eq(&existing.manifest) {
                    // Converged; a second pass issues zero writes.
                    return Ok(());
                }
                store.update_owned(OwnedObject {
                    manifest: next,
                    owner: owner.clone(),
                    uid: existing.uid,
                    revision: existing.revision,
                })?;
                Ok(())
            }
        }
    })
    .await;

    result.map_err(|err| {
        if err.is_conflict() {
            ReconcileError::Conflict {
                kind,
                name: manifest.name().to_string(),
                attempts: retry.attempts,
            }
        } else {
            ReconcileError::Store(err)
        }
    })
}

/// Delete each orphan, collecting per-object failures into one aggregate
/// error so one failing deletion does not block the rest.
pub async fn prune_owned_objects(
    store: &dyn ResourceStore,
    orphans: impl IntoIterator<Item = OwnedObject>,
) -> Result<(), ReconcileError> {
    let mut errs = Vec::new();
    for obj in orphans {
        let key = obj.key();
        debug!(object = %key, kind = %obj.kind(), "pruning unmanaged object");
        match store.delete_owned(obj.kind(), &key) {
            Ok(()) => {}
            // Already gone is the outcome pruning wanted.
            Err(err) if err.is_not_found() => {}
            Err(err) => errs.push(ReconcileError::Store(err)),
        }
    }
    match ReconcileError::join(errs) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
