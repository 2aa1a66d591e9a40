//! Desired-state generator contract.
//!
//! A generator is a pure, deterministic function from a resource spec to the
//! manifests of its owned objects: unchanged spec, byte-identical output.
//! The only cluster state a generator may consult is the supplied
//! [`SiblingLookup`], which resolves connection settings shared across
//! sibling resources of the same provider kind. Adding a kind means
//! registering a generator, not editing a dispatcher.

pub mod agent;
pub mod datasource;

use crate::error::ReconcileError;
use crate::manifest::OwnedManifest;
use crate::resource::datasource::{DataSourceProvider, WarehouseConfig};
use crate::resource::PrimaryResource;
use crate::store::ResourceStore;
use crate::types::{ResourceKey, ResourceKind};
use std::collections::HashMap;
use std::sync::Arc;

pub use agent::AgentGenerator;
pub use datasource::DataSourceGenerator;

/// Lookup for connection settings shared across sibling resources.
pub trait SiblingLookup {
    /// Provider configuration of some sibling resource of the given provider
    /// kind, or None when no sibling carries one.
    fn provider_config(&self, provider: DataSourceProvider) -> Option<WarehouseConfig>;
}

/// A lookup that never finds siblings; for tests and standalone generation.
pub struct NoSiblings;

impl SiblingLookup for NoSiblings {
    fn provider_config(&self, _provider: DataSourceProvider) -> Option<WarehouseConfig> {
        None
    }
}

/// Sibling lookup backed by the resource store. Resolution is deterministic:
/// candidates are scanned in key order, skipping the resource being
/// reconciled.
pub struct StoreSiblingLookup<'a> {
    store: &'a dyn ResourceStore,
    namespace: String,
    exclude: ResourceKey,
}

impl<'a> StoreSiblingLookup<'a> {
    pub fn new(store: &'a dyn ResourceStore, exclude: ResourceKey) -> Self {
        Self {
            store,
            namespace: exclude.namespace.clone(),
            exclude,
        }
    }
}

impl SiblingLookup for StoreSiblingLookup<'_> {
    fn provider_config(&self, provider: DataSourceProvider) -> Option<WarehouseConfig> {
        let siblings = self.store.list_resources(ResourceKind::DataSource).ok()?;
        siblings.into_iter().find_map(|res| match res {
            PrimaryResource::DataSource { metadata, spec, .. }
                if metadata.key.namespace == self.namespace
                    && metadata.key != self.exclude
                    && spec.provider == provider =>
            {
                spec.warehouse
            }
            _ => None,
        })
    }
}

/// Pure mapping from a resource spec to its owned-object manifests.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        resource: &PrimaryResource,
        siblings: &dyn SiblingLookup,
    ) -> Result<Vec<OwnedManifest>, ReconcileError>;
}

/// Registry mapping resource kinds to their generators. Kinds that own no
/// objects (ModelConfig, RemoteServer) simply have no entry.
#[derive(Default)]
pub struct GeneratorRegistry {
    generators: HashMap<ResourceKind, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, generator: Arc<dyn Generator>) {
        self.generators.insert(kind, generator);
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&Arc<dyn Generator>> {
        self.generators.get(&kind)
    }

    /// Registry with the built-in generators.
    pub fn with_defaults(config: &crate::config::EngineConfig) -> Self {
        let mut registry = Self::new();
        registry.register(
            ResourceKind::DataSource,
            Arc::new(DataSourceGenerator::new(config.workload_image_ref())),
        );
        registry.register(
            ResourceKind::Agent,
            Arc::new(AgentGenerator::new(config.runtime_image_ref())),
        );
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_default_registry_covers_owning_kinds() {
        let registry = GeneratorRegistry::with_defaults(&EngineConfig::default());
        assert!(registry.get(ResourceKind::DataSource).is_some());
        assert!(registry.get(ResourceKind::Agent).is_some());
        assert!(registry.get(ResourceKind::ModelConfig).is_none());
        assert!(registry.get(ResourceKind::RemoteServer).is_none());
    }
}
