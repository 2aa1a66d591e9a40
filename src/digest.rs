//! Credential change detection.
//!
//! Computes one deterministic digest over all secret material a resource
//! references. The digest, not the secret content, is persisted to status;
//! a changed digest is the sole trigger for re-materializing objects whose
//! configuration embeds credential-derived values. Which individual secret
//! changed is deliberately not retained.

use crate::error::ReconcileError;
use crate::resource::{Secret, SecretReference};
use crate::store::ResourceStore;
use crate::types::ResourceKey;

/// A secret resolved against the store, paired with its fully-qualified key.
#[derive(Debug, Clone)]
pub struct ResolvedSecret {
    pub key: ResourceKey,
    pub secret: Secret,
}

/// Resolve each reference in the owner's namespace, verifying that any named
/// key exists. Missing material surfaces as a credentials error so the
/// Connected condition can report it.
pub fn resolve_secret_refs(
    store: &dyn ResourceStore,
    namespace: &str,
    refs: &[SecretReference],
) -> Result<Vec<ResolvedSecret>, ReconcileError> {
    let mut resolved = Vec::with_capacity(refs.len());
    for secret_ref in refs {
        let key = ResourceKey::new(namespace, secret_ref.name.clone());
        let secret = store.get_secret(&key)?.ok_or_else(|| {
            ReconcileError::MissingSecret {
                secret: key.clone(),
                detail: "not found".into(),
            }
        })?;
        if !secret_ref.key.is_empty() && !secret.data.contains_key(&secret_ref.key) {
            return Err(ReconcileError::MissingSecret {
                secret: key,
                detail: format!("key {:?} not found", secret_ref.key),
            });
        }
        resolved.push(ResolvedSecret { key, secret });
    }
    Ok(resolved)
}

/// Compute the hex digest over the given secrets.
///
/// Secrets are sorted by fully-qualified name and each secret's entries by
/// key, then name, keys and values are fed to the accumulator in that fixed
/// order, so the output is invariant to the store's internal map ordering.
pub fn secret_digest(secrets: &[ResolvedSecret]) -> String {
    let mut sorted: Vec<&ResolvedSecret> = secrets.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));

    let mut hasher = blake3::Hasher::new();
    for entry in sorted {
        hasher.update(entry.key.to_string().as_bytes());

        let mut keys: Vec<&String> = entry.secret.data.keys().collect();
        keys.sort();
        for k in keys {
            hasher.update(k.as_bytes());
            if let Some(v) = entry.secret.data.get(k) {
                hasher.update(v);
            }
        }
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// Resolve and digest in one step; the common path for reconcile bodies.
pub fn digest_secret_refs(
    store: &dyn ResourceStore,
    namespace: &str,
    refs: &[SecretReference],
) -> Result<String, ReconcileError> {
    let resolved = resolve_secret_refs(store, namespace, refs)?;
    Ok(secret_digest(&resolved))
}
