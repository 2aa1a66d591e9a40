//! Secret reverse index.
//!
//! Maps a secret's key to the primary resources whose specs reference it, so
//! the watch router can translate a secret change event into reconcile
//! requests for the affected owners. Rebuilt from the resource's current
//! references on every reconcile and cleared on owner deletion.

use crate::types::{ResourceKey, ResourceKind};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

type Owner = (ResourceKind, ResourceKey);

/// Reverse index: secret key -> owning resources.
#[derive(Default)]
pub struct SecretIndex {
    entries: RwLock<HashMap<ResourceKey, HashSet<Owner>>>,
}

impl SecretIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of secrets referenced by `owner`. Stale entries from a
    /// previous spec revision are dropped.
    pub fn set_references(
        &self,
        kind: ResourceKind,
        owner: &ResourceKey,
        secrets: impl IntoIterator<Item = ResourceKey>,
    ) {
        let owner: Owner = (kind, owner.clone());
        let wanted: HashSet<ResourceKey> = secrets.into_iter().collect();

        let mut entries = self.entries.write();
        entries.retain(|secret, owners| {
            if !wanted.contains(secret) {
                owners.remove(&owner);
            }
            !owners.is_empty()
        });
        for secret in wanted {
            entries.entry(secret).or_default().insert(owner.clone());
        }
    }

    /// Drop every entry for `owner`, e.g. when the resource is deleted.
    pub fn remove_owner(&self, kind: ResourceKind, owner: &ResourceKey) {
        let owner: Owner = (kind, owner.clone());
        let mut entries = self.entries.write();
        entries.retain(|_, owners| {
            owners.remove(&owner);
            !owners.is_empty()
        });
    }

    /// Resources referencing the given secret, in deterministic order.
    pub fn owners_of(&self, secret: &ResourceKey) -> Vec<Owner> {
        let entries = self.entries.read();
        let mut owners: Vec<Owner> = entries
            .get(secret)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        owners.sort_by(|a, b| (a.0.as_str(), &a.1).cmp(&(b.0.as_str(), &b.1)));
        owners
    }
}
