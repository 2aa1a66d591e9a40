//! Durable catalog side index.
//!
//! Holds the records the engine derives from reconciliation but must not lose
//! across restarts or status wipes: cached derived agent configs, remote
//! endpoint records, and the last-known-good capability snapshot per
//! endpoint. Each of the two stores carries its own in-process lock, held
//! only across the in-memory/sled mutation, never across a network call:
//! distinct resource keys can resolve to the same derived record name.

use crate::error::CatalogError;
use crate::resource::remote::{DiscoveredCapability, RemoteProtocol};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const TREE_AGENT_CONFIGS: &str = "agent-configs";
const TREE_SERVERS: &str = "servers";
const TREE_CAPABILITIES: &str = "capabilities";

/// Derived runtime configuration for one agent, cached for the API surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfigRecord {
    pub id: String,
    pub model: String,
    pub system_prompt: String,
    pub tool_servers: Vec<String>,
}

/// Record describing one remote tool endpoint, refreshed on every discovery
/// attempt regardless of outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: String,
    pub description: String,
    pub protocol: RemoteProtocol,
    pub url: String,
}

/// Cache of derived agent configs. Guarded by its own lock.
pub struct DerivedConfigCache {
    tree: sled::Tree,
    lock: Mutex<()>,
}

impl DerivedConfigCache {
    fn new(tree: sled::Tree) -> Self {
        Self {
            tree,
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self, record: &AgentConfigRecord) -> Result<(), CatalogError> {
        let _guard = self.lock.lock();
        let bytes = serde_json::to_vec(record)?;
        self.tree.insert(record.id.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<AgentConfigRecord>, CatalogError> {
        match self.tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, id: &str) -> Result<(), CatalogError> {
        let _guard = self.lock.lock();
        self.tree.remove(id.as_bytes())?;
        Ok(())
    }
}

/// Index of remote endpoints and their capability snapshots. Guarded by its
/// own lock, separate from the derived-config cache.
pub struct CapabilityIndex {
    servers: sled::Tree,
    capabilities: sled::Tree,
    lock: Mutex<()>,
}

impl CapabilityIndex {
    fn new(servers: sled::Tree, capabilities: sled::Tree) -> Self {
        Self {
            servers,
            capabilities,
            lock: Mutex::new(()),
        }
    }

    /// Insert or refresh the record for one endpoint.
    pub fn upsert_server(&self, record: &ServerRecord) -> Result<(), CatalogError> {
        let _guard = self.lock.lock();
        let bytes = serde_json::to_vec(record)?;
        self.servers.insert(record.id.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_server(&self, id: &str) -> Result<Option<ServerRecord>, CatalogError> {
        match self.servers.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Atomically replace the capability snapshot for one endpoint. Full
    /// replace, not merge: capabilities absent from `capabilities` disappear.
    pub fn replace_capabilities(
        &self,
        id: &str,
        capabilities: &[DiscoveredCapability],
    ) -> Result<(), CatalogError> {
        let _guard = self.lock.lock();
        let bytes = serde_json::to_vec(capabilities)?;
        self.capabilities.insert(id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Last-known-good capability snapshot, if any attempt ever succeeded.
    pub fn capabilities_for(&self, id: &str) -> Result<Option<Vec<DiscoveredCapability>>, CatalogError> {
        match self.capabilities.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Drop the endpoint record and its snapshot, e.g. on resource deletion.
    pub fn delete_server(&self, id: &str) -> Result<(), CatalogError> {
        let _guard = self.lock.lock();
        self.servers.remove(id.as_bytes())?;
        self.capabilities.remove(id.as_bytes())?;
        Ok(())
    }
}

/// Handle bundling the sled database and its two stores.
pub struct Catalog {
    pub derived_configs: DerivedConfigCache,
    pub capability_index: CapabilityIndex,
    _db: sled::Db,
}

impl Catalog {
    /// Open (or create) the catalog at the given path.
    pub fn open(path: &Path) -> Result<Arc<Self>, CatalogError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Open an ephemeral catalog backed by a temporary sled database. Used in
    /// tests and by embedders that do not need durability.
    pub fn open_ephemeral() -> Result<Arc<Self>, CatalogError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Arc<Self>, CatalogError> {
        let agent_configs = db.open_tree(TREE_AGENT_CONFIGS)?;
        let servers = db.open_tree(TREE_SERVERS)?;
        let capabilities = db.open_tree(TREE_CAPABILITIES)?;
        Ok(Arc::new(Self {
            derived_configs: DerivedConfigCache::new(agent_configs),
            capability_index: CapabilityIndex::new(servers, capabilities),
            _db: db,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(names: &[&str]) -> Vec<DiscoveredCapability> {
        names
            .iter()
            .map(|n| DiscoveredCapability {
                name: (*n).into(),
                description: format!("{n} tool"),
            })
            .collect()
    }

    #[test]
    fn test_agent_config_round_trip() {
        let catalog = Catalog::open_ephemeral().unwrap();
        let record = AgentConfigRecord {
            id: "default/helper".into(),
            model: "gpt-4.1".into(),
            system_prompt: "You are helpful.".into(),
            tool_servers: vec!["default/sales-mcp".into()],
        };
        catalog.derived_configs.store(&record).unwrap();
        assert_eq!(
            catalog.derived_configs.get("default/helper").unwrap(),
            Some(record)
        );

        catalog.derived_configs.delete("default/helper").unwrap();
        assert!(catalog.derived_configs.get("default/helper").unwrap().is_none());
    }

    #[test]
    fn test_capability_snapshot_full_replace() {
        let catalog = Catalog::open_ephemeral().unwrap();
        catalog
            .capability_index
            .replace_capabilities("default/tools", &caps(&["query", "list"]))
            .unwrap();
        catalog
            .capability_index
            .replace_capabilities("default/tools", &caps(&["query"]))
            .unwrap();

        let snapshot = catalog
            .capability_index
            .capabilities_for("default/tools")
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "query");
    }

    #[test]
    fn test_delete_server_drops_snapshot() {
        let catalog = Catalog::open_ephemeral().unwrap();
        catalog
            .capability_index
            .upsert_server(&ServerRecord {
                id: "default/tools".into(),
                description: "tools".into(),
                protocol: RemoteProtocol::StreamableHttp,
                url: "http://tools.default:8080/mcp".into(),
            })
            .unwrap();
        catalog
            .capability_index
            .replace_capabilities("default/tools", &caps(&["query"]))
            .unwrap();

        catalog.capability_index.delete_server("default/tools").unwrap();
        assert!(catalog.capability_index.get_server("default/tools").unwrap().is_none());
        assert!(catalog
            .capability_index
            .capabilities_for("default/tools")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog");
        {
            let catalog = Catalog::open(&path).unwrap();
            catalog
                .capability_index
                .replace_capabilities("default/tools", &caps(&["query"]))
                .unwrap();
        }
        let catalog = Catalog::open(&path).unwrap();
        let snapshot = catalog
            .capability_index
            .capabilities_for("default/tools")
            .unwrap()
            .unwrap();
        assert_eq!(snapshot[0].name, "query");
    }
}
