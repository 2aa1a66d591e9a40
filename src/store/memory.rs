//! In-memory reference store.
//!
//! Implements the full [`ResourceStore`] contract: revision-checked writes,
//! uid assignment, owner-based cascade deletion, endpoint address allocation,
//! and a broadcast watch stream. Backs the engine's tests and single-process
//! embeddings.

use super::{ChangeEvent, OwnedObject, ResourceStore};
use crate::error::StoreError;
use crate::manifest::{OwnedManifest, OwnerRef};
use crate::resource::{PrimaryResource, Secret};
use crate::types::{OwnedKind, ResourceKey, ResourceKind, Uid};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

const WATCH_CAPACITY: usize = 256;

#[derive(Default)]
struct StoreInner {
    resources: HashMap<(ResourceKind, ResourceKey), PrimaryResource>,
    secrets: HashMap<ResourceKey, Secret>,
    owned: HashMap<(OwnedKind, ResourceKey), OwnedObject>,
    next_uid: u64,
    next_address: u64,
}

impl StoreInner {
    fn allocate_uid(&mut self) -> Uid {
        self.next_uid += 1;
        Uid(self.next_uid)
    }

    fn allocate_address(&mut self) -> String {
        self.next_address += 1;
        format!("10.96.{}.{}", self.next_address / 256, self.next_address % 256)
    }
}

/// In-memory, watch-capable store.
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
    events: broadcast::Sender<ChangeEvent>,
    // Write counters exposed for convergence and write-suppression tests.
    spec_writes: AtomicU64,
    status_writes: AtomicU64,
    owned_writes: AtomicU64,
    owned_deletes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            inner: RwLock::new(StoreInner::default()),
            events,
            spec_writes: AtomicU64::new(0),
            status_writes: AtomicU64::new(0),
            owned_writes: AtomicU64::new(0),
            owned_deletes: AtomicU64::new(0),
        }
    }

    /// Number of status writes accepted since construction.
    pub fn status_write_count(&self) -> u64 {
        self.status_writes.load(Ordering::SeqCst)
    }

    /// Number of owned-object creates/updates accepted since construction.
    pub fn owned_write_count(&self) -> u64 {
        self.owned_writes.load(Ordering::SeqCst)
    }

    /// Number of owned-object deletions, including cascades.
    pub fn owned_delete_count(&self) -> u64 {
        self.owned_deletes.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ChangeEvent) {
        // Nobody listening is fine; tests often drive the store directly.
        let _ = self.events.send(event);
    }
}

impl ResourceStore for MemoryStore {
    fn get_resource(
        &self,
        kind: ResourceKind,
        key: &ResourceKey,
    ) -> Result<Option<PrimaryResource>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.resources.get(&(kind, key.clone())).cloned())
    }

    fn list_resources(&self, kind: ResourceKind) -> Result<Vec<PrimaryResource>, StoreError> {
        let inner = self.inner.read();
        let mut out: Vec<PrimaryResource> = inner
            .resources
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, v)| v.clone())
            .collect();
        out.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(out)
    }

    fn create_resource(&self, mut resource: PrimaryResource) -> Result<PrimaryResource, StoreError> {
        let kind = resource.kind();
        let key = resource.key().clone();
        {
            let mut inner = self.inner.write();
            if inner.resources.contains_key(&(kind, key.clone())) {
                return Err(StoreError::InvalidWrite(format!(
                    "{kind} {key} already exists"
                )));
            }
            let uid = inner.allocate_uid();
            let meta = resource.metadata_mut();
            meta.uid = uid;
            meta.generation = 1;
            meta.resource_version = 1;
            inner.resources.insert((kind, key.clone()), resource.clone());
        }
        self.spec_writes.fetch_add(1, Ordering::SeqCst);
        self.emit(ChangeEvent::Primary { kind, key });
        Ok(resource)
    }

    fn update_spec(&self, mut resource: PrimaryResource) -> Result<PrimaryResource, StoreError> {
        let kind = resource.kind();
        let key = resource.key().clone();
        {
            let mut inner = self.inner.write();
            let current = inner
                .resources
                .get(&(kind, key.clone()))
                .ok_or_else(|| StoreError::not_found(format!("{kind} {key}")))?;
            let expected = resource.metadata().resource_version;
            if current.metadata().resource_version != expected {
                return Err(StoreError::Conflict {
                    what: format!("{kind} {key}"),
                    expected,
                });
            }
            let meta = resource.metadata_mut();
            meta.uid = current.uid();
            meta.generation = current.generation() + 1;
            meta.resource_version = expected + 1;
            inner.resources.insert((kind, key.clone()), resource.clone());
        }
        self.spec_writes.fetch_add(1, Ordering::SeqCst);
        self.emit(ChangeEvent::Primary { kind, key });
        Ok(resource)
    }

    fn update_status(&self, mut resource: PrimaryResource) -> Result<PrimaryResource, StoreError> {
        let kind = resource.kind();
        let key = resource.key().clone();
        {
            let mut inner = self.inner.write();
            let current = inner
                .resources
                .get(&(kind, key.clone()))
                .ok_or_else(|| StoreError::not_found(format!("{kind} {key}")))?;
            let expected = resource.metadata().resource_version;
            if current.metadata().resource_version != expected {
                return Err(StoreError::Conflict {
                    what: format!("{kind} {key} status"),
                    expected,
                });
            }
            // Status writes keep the spec revision: carry generation and uid
            // forward from the stored object.
            let meta = resource.metadata_mut();
            meta.uid = current.uid();
            meta.generation = current.generation();
            meta.resource_version = expected + 1;
            inner.resources.insert((kind, key.clone()), resource.clone());
        }
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        // No primary event: status writes must not re-trigger reconciliation
        // of the resource that produced them.
        Ok(resource)
    }

    fn delete_resource(&self, kind: ResourceKind, key: &ResourceKey) -> Result<(), StoreError> {
        let cascade: Vec<OwnedObject>;
        {
            let mut inner = self.inner.write();
            let removed = inner
                .resources
                .remove(&(kind, key.clone()))
                .ok_or_else(|| StoreError::not_found(format!("{kind} {key}")))?;
            let owner_uid = removed.uid();
            let doomed: Vec<(OwnedKind, ResourceKey)> = inner
                .owned
                .iter()
                .filter(|(_, obj)| obj.owner.uid == owner_uid)
                .map(|(k, _)| k.clone())
                .collect();
            cascade = doomed
                .into_iter()
                .filter_map(|k| inner.owned.remove(&k))
                .collect();
        }
        self.owned_deletes
            .fetch_add(cascade.len() as u64, Ordering::SeqCst);
        self.emit(ChangeEvent::Primary {
            kind,
            key: key.clone(),
        });
        for obj in cascade {
            self.emit(ChangeEvent::Owned {
                kind: obj.kind(),
                key: obj.key(),
                owner: obj.owner.clone(),
            });
        }
        Ok(())
    }

    fn get_secret(&self, key: &ResourceKey) -> Result<Option<Secret>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.secrets.get(key).cloned())
    }

    fn put_secret(&self, secret: Secret) -> Result<(), StoreError> {
        let key = secret.key.clone();
        {
            let mut inner = self.inner.write();
            inner.secrets.insert(key.clone(), secret);
        }
        self.emit(ChangeEvent::Secret { key });
        Ok(())
    }

    fn get_owned(
        &self,
        kind: OwnedKind,
        key: &ResourceKey,
    ) -> Result<Option<OwnedObject>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.owned.get(&(kind, key.clone())).cloned())
    }

    fn list_owned_by(&self, owner: Uid) -> Result<Vec<OwnedObject>, StoreError> {
        let inner = self.inner.read();
        let mut out: Vec<OwnedObject> = inner
            .owned
            .values()
            .filter(|obj| obj.owner.uid == owner)
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.kind(), a.key()).cmp(&(b.kind(), b.key())));
        Ok(out)
    }

    fn create_owned(
        &self,
        mut manifest: OwnedManifest,
        owner: OwnerRef,
    ) -> Result<OwnedObject, StoreError> {
        let kind = manifest.kind();
        let key = ResourceKey::new(owner.key.namespace.clone(), manifest.name());
        let object = {
            let mut inner = self.inner.write();
            if inner.owned.contains_key(&(kind, key.clone())) {
                return Err(StoreError::InvalidWrite(format!(
                    "{kind} {key} already exists"
                )));
            }
            if let OwnedManifest::Endpoint(endpoint) = &mut manifest {
                endpoint.cluster_address = Some(inner.allocate_address());
            }
            let uid = inner.allocate_uid();
            let object = OwnedObject {
                manifest,
                owner,
                uid,
                revision: 1,
            };
            inner.owned.insert((kind, key.clone()), object.clone());
            object
        };
        self.owned_writes.fetch_add(1, Ordering::SeqCst);
        self.emit(ChangeEvent::Owned {
            kind,
            key,
            owner: object.owner.clone(),
        });
        Ok(object)
    }

    fn update_owned(&self, mut object: OwnedObject) -> Result<OwnedObject, StoreError> {
        let kind = object.kind();
        let key = object.key();
        {
            let mut inner = self.inner.write();
            let current = inner
                .owned
                .get(&(kind, key.clone()))
                .ok_or_else(|| StoreError::not_found(format!("{kind} {key}")))?;
            if current.revision != object.revision {
                return Err(StoreError::Conflict {
                    what: format!("{kind} {key}"),
                    expected: object.revision,
                });
            }
            object.uid = current.uid;
            object.revision += 1;
            inner.owned.insert((kind, key.clone()), object.clone());
        }
        self.owned_writes.fetch_add(1, Ordering::SeqCst);
        self.emit(ChangeEvent::Owned {
            kind,
            key,
            owner: object.owner.clone(),
        });
        Ok(object)
    }

    fn delete_owned(&self, kind: OwnedKind, key: &ResourceKey) -> Result<(), StoreError> {
        let removed = {
            let mut inner = self.inner.write();
            inner
                .owned
                .remove(&(kind, key.clone()))
                .ok_or_else(|| StoreError::not_found(format!("{kind} {key}")))?
        };
        self.owned_deletes.fetch_add(1, Ordering::SeqCst);
        self.emit(ChangeEvent::Owned {
            kind,
            key: key.clone(),
            owner: removed.owner,
        });
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::EndpointManifest;
    use crate::resource::{AgentSpec, AgentStatus, Metadata};
    use std::collections::BTreeMap;

    fn agent(name: &str) -> PrimaryResource {
        PrimaryResource::Agent {
            metadata: Metadata::new(ResourceKey::new("default", name)),
            spec: AgentSpec {
                description: String::new(),
                model_config: "default-model".into(),
                system_prompt: String::new(),
                tool_servers: Vec::new(),
            },
            status: AgentStatus::default(),
        }
    }

    fn endpoint_manifest(name: &str) -> OwnedManifest {
        OwnedManifest::Endpoint(EndpointManifest {
            name: name.into(),
            labels: BTreeMap::new(),
            selector: BTreeMap::new(),
            port: 8080,
            cluster_address: None,
        })
    }

    #[test]
    fn test_create_assigns_identity() {
        let store = MemoryStore::new();
        let created = store.create_resource(agent("a")).unwrap();
        assert_eq!(created.generation(), 1);
        assert_eq!(created.metadata().resource_version, 1);
        assert_ne!(created.uid(), Uid(0));
    }

    #[test]
    fn test_spec_update_bumps_generation() {
        let store = MemoryStore::new();
        let created = store.create_resource(agent("a")).unwrap();
        let updated = store.update_spec(created).unwrap();
        assert_eq!(updated.generation(), 2);
        assert_eq!(updated.metadata().resource_version, 2);
    }

    #[test]
    fn test_status_update_keeps_generation() {
        let store = MemoryStore::new();
        let created = store.create_resource(agent("a")).unwrap();
        let updated = store.update_status(created).unwrap();
        assert_eq!(updated.generation(), 1);
        assert_eq!(updated.metadata().resource_version, 2);
        assert_eq!(store.status_write_count(), 1);
    }

    #[test]
    fn test_stale_write_conflicts() {
        let store = MemoryStore::new();
        let created = store.create_resource(agent("a")).unwrap();
        let _fresh = store.update_spec(created.clone()).unwrap();
        let err = store.update_spec(created).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_endpoint_gets_cluster_address() {
        let store = MemoryStore::new();
        let owner_res = store.create_resource(agent("a")).unwrap();
        let owner = OwnerRef {
            kind: ResourceKind::Agent,
            key: owner_res.key().clone(),
            uid: owner_res.uid(),
        };
        let created = store
            .create_owned(endpoint_manifest("a-runtime"), owner)
            .unwrap();
        match created.manifest {
            OwnedManifest::Endpoint(e) => assert!(e.cluster_address.is_some()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_cascade_delete_on_owner_removal() {
        let store = MemoryStore::new();
        let owner_res = store.create_resource(agent("a")).unwrap();
        let owner = OwnerRef {
            kind: ResourceKind::Agent,
            key: owner_res.key().clone(),
            uid: owner_res.uid(),
        };
        store
            .create_owned(endpoint_manifest("a-runtime"), owner.clone())
            .unwrap();

        // A second resource's children must survive the cascade.
        let other_res = store.create_resource(agent("b")).unwrap();
        let other = OwnerRef {
            kind: ResourceKind::Agent,
            key: other_res.key().clone(),
            uid: other_res.uid(),
        };
        store
            .create_owned(endpoint_manifest("b-runtime"), other.clone())
            .unwrap();

        store
            .delete_resource(ResourceKind::Agent, owner_res.key())
            .unwrap();

        assert!(store
            .get_owned(OwnedKind::Endpoint, &ResourceKey::new("default", "a-runtime"))
            .unwrap()
            .is_none());
        assert!(store
            .get_owned(OwnedKind::Endpoint, &ResourceKey::new("default", "b-runtime"))
            .unwrap()
            .is_some());
        assert!(store.list_owned_by(owner.uid).unwrap().is_empty());
        assert_eq!(store.list_owned_by(other.uid).unwrap().len(), 1);
    }

    #[test]
    fn test_watch_sees_secret_changes() {
        let store = MemoryStore::new();
        let mut rx = store.watch();
        store
            .put_secret(Secret::new(ResourceKey::new("default", "creds")).with_entry("token", "abc"))
            .unwrap();
        match rx.try_recv().unwrap() {
            ChangeEvent::Secret { key } => assert_eq!(key.name, "creds"),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
