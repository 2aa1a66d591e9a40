//! Resource store boundary.
//!
//! The engine consumes the store through the [`ResourceStore`] trait: typed
//! CRUD over primary resources, secrets, and owned objects, plus a watch
//! stream of change events. All writes are revision-checked; the engine never
//! writes a spec. An in-memory reference implementation lives in
//! [`memory`].

pub mod memory;

use crate::error::StoreError;
use crate::manifest::{OwnedManifest, OwnerRef};
use crate::resource::{PrimaryResource, Secret};
use crate::types::{OwnedKind, ResourceKey, ResourceKind, Uid};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use memory::MemoryStore;

/// A stored owned object: the manifest plus store-managed identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedObject {
    pub manifest: OwnedManifest,
    pub owner: OwnerRef,
    pub uid: Uid,
    pub revision: u64,
}

impl OwnedObject {
    pub fn kind(&self) -> OwnedKind {
        self.manifest.kind()
    }

    pub fn name(&self) -> &str {
        self.manifest.name()
    }

    /// Key of this object: owner namespace + manifest name.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.owner.key.namespace.clone(), self.manifest.name())
    }
}

/// A change observed on the store, delivered over the watch stream.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A primary resource's spec was created, edited, or the resource was
    /// deleted. Status-only writes do not produce primary events.
    Primary { kind: ResourceKind, key: ResourceKey },
    /// An owned object changed; carries its owner for reverse routing.
    Owned {
        kind: OwnedKind,
        key: ResourceKey,
        owner: OwnerRef,
    },
    /// Secret material changed.
    Secret { key: ResourceKey },
}

/// Typed CRUD + watch over the object store.
///
/// Read-after-write consistency holds within one reconcile invocation for
/// that invocation's own operations, not across invocations; writers must be
/// prepared for [`StoreError::Conflict`].
pub trait ResourceStore: Send + Sync {
    fn get_resource(
        &self,
        kind: ResourceKind,
        key: &ResourceKey,
    ) -> Result<Option<PrimaryResource>, StoreError>;

    fn list_resources(&self, kind: ResourceKind) -> Result<Vec<PrimaryResource>, StoreError>;

    /// Create a resource, assigning uid, generation 1 and revision 1.
    fn create_resource(&self, resource: PrimaryResource) -> Result<PrimaryResource, StoreError>;

    /// Replace a resource's spec, bumping its generation. Rejected with
    /// [`StoreError::Conflict`] when the carried revision is stale.
    fn update_spec(&self, resource: PrimaryResource) -> Result<PrimaryResource, StoreError>;

    /// Replace a resource's status only. Distinct from [`Self::update_spec`];
    /// the generation is left untouched.
    fn update_status(&self, resource: PrimaryResource) -> Result<PrimaryResource, StoreError>;

    /// Delete a resource. Objects owned by its uid are cascade-deleted.
    fn delete_resource(&self, kind: ResourceKind, key: &ResourceKey) -> Result<(), StoreError>;

    fn get_secret(&self, key: &ResourceKey) -> Result<Option<Secret>, StoreError>;

    fn put_secret(&self, secret: Secret) -> Result<(), StoreError>;

    fn get_owned(
        &self,
        kind: OwnedKind,
        key: &ResourceKey,
    ) -> Result<Option<OwnedObject>, StoreError>;

    /// All objects owned by the given uid.
    fn list_owned_by(&self, owner: Uid) -> Result<Vec<OwnedObject>, StoreError>;

    /// Create an owned object stamped with the given owner.
    fn create_owned(
        &self,
        manifest: OwnedManifest,
        owner: OwnerRef,
    ) -> Result<OwnedObject, StoreError>;

    /// Replace an owned object's manifest. Rejected with
    /// [`StoreError::Conflict`] when the carried revision is stale.
    fn update_owned(&self, object: OwnedObject) -> Result<OwnedObject, StoreError>;

    fn delete_owned(&self, kind: OwnedKind, key: &ResourceKey) -> Result<(), StoreError>;

    /// Subscribe to change events.
    fn watch(&self) -> broadcast::Receiver<ChangeEvent>;
}
