//! DataSource resource: a connection to a data warehouse whose semantic
//! models are exposed to agents through a generated tool endpoint.

use crate::resource::condition::Condition;
use crate::resource::SecretReference;
use crate::types::Generation;
use serde::{Deserialize, Serialize};

/// Supported data platform providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSourceProvider {
    Warehouse,
}

impl DataSourceProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceProvider::Warehouse => "Warehouse",
        }
    }
}

/// Warehouse-specific connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseConfig {
    /// Workspace base URL, e.g. `https://mycompany.example.com`.
    pub workspace_url: String,
    /// Name of the secret holding the access token.
    pub credentials_secret_ref: String,
    /// Key within the secret that holds the token.
    pub credentials_secret_key: String,
    /// Catalog to expose models from.
    pub catalog: String,
    /// Optional schema filter within the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// SQL warehouse to execute queries on. When absent, a sibling
    /// DataSource of the same provider may supply one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<String>,
}

/// A semantic model selected for exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticModelRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A semantic model discovered in the warehouse catalog, surfaced in status
/// so users can select models to expose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredModel {
    pub name: String,
    pub catalog: String,
    pub schema: String,
    #[serde(default)]
    pub description: String,
}

/// Desired state of a DataSource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceSpec {
    pub provider: DataSourceProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<WarehouseConfig>,
    #[serde(default)]
    pub semantic_models: Vec<SemanticModelRef>,
}

impl DataSourceSpec {
    /// Secret references this spec depends on.
    pub fn secret_refs(&self) -> Vec<SecretReference> {
        match &self.warehouse {
            Some(cfg) if !cfg.credentials_secret_ref.is_empty() => vec![SecretReference {
                name: cfg.credentials_secret_ref.clone(),
                key: cfg.credentials_secret_key.clone(),
            }],
            _ => Vec::new(),
        }
    }
}

/// Observed state of a DataSource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceStatus {
    #[serde(default)]
    pub observed_generation: Generation,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Models discovered in the warehouse catalog.
    #[serde(default)]
    pub available_models: Vec<DiscoveredModel>,
    /// Name of the generated tool endpoint trio, `"{name}-mcp"`.
    #[serde(default)]
    pub generated_server: String,
    /// Digest of the referenced credentials, used to detect rotation.
    #[serde(default)]
    pub secret_hash: String,
}
