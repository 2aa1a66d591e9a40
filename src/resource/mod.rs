//! Primary resource model: user-declared intent objects and their statuses.
//!
//! A primary resource is mutated through two disjoint paths: users edit the
//! spec (bumping `generation`), the engine edits the status. Never both in
//! the same write.

pub mod agent;
pub mod condition;
pub mod datasource;
pub mod modelconfig;
pub mod remote;

use crate::types::{Generation, ResourceKey, ResourceKind, Uid};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use agent::{AgentSpec, AgentStatus};
pub use condition::{Condition, ConditionStatus};
pub use datasource::{
    DataSourceProvider, DataSourceSpec, DataSourceStatus, DiscoveredModel, SemanticModelRef,
    WarehouseConfig,
};
pub use modelconfig::{ModelConfigSpec, ModelConfigStatus, TlsConfig};
pub use remote::{
    DiscoveredCapability, HeaderFromSecret, RemoteProtocol, RemoteServerSpec, RemoteServerStatus,
};

/// Store-managed identity and revision fields common to every resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub key: ResourceKey,
    pub uid: Uid,
    /// Spec revision; bumped by the store on spec edits only.
    pub generation: Generation,
    /// Object revision; bumped by the store on every write, including status.
    pub resource_version: u64,
}

impl Metadata {
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            uid: Uid(0),
            generation: 0,
            resource_version: 0,
        }
    }
}

/// Reference to a secret in the owning resource's namespace. Only a digest of
/// the referenced material is ever persisted to status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretReference {
    pub name: String,
    /// Key within the secret. Empty means the whole secret.
    #[serde(default)]
    pub key: String,
}

/// Opaque secret material, resolved at reconcile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub key: ResourceKey,
    pub data: HashMap<String, Vec<u8>>,
}

impl Secret {
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            data: HashMap::new(),
        }
    }

    pub fn with_entry(mut self, k: impl Into<String>, v: impl Into<Vec<u8>>) -> Self {
        self.data.insert(k.into(), v.into());
        self
    }
}

/// A user-declared intent object, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PrimaryResource {
    Agent {
        metadata: Metadata,
        spec: AgentSpec,
        #[serde(default)]
        status: AgentStatus,
    },
    DataSource {
        metadata: Metadata,
        spec: DataSourceSpec,
        #[serde(default)]
        status: DataSourceStatus,
    },
    ModelConfig {
        metadata: Metadata,
        spec: ModelConfigSpec,
        #[serde(default)]
        status: ModelConfigStatus,
    },
    RemoteServer {
        metadata: Metadata,
        spec: RemoteServerSpec,
        #[serde(default)]
        status: RemoteServerStatus,
    },
}

impl PrimaryResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            PrimaryResource::Agent { .. } => ResourceKind::Agent,
            PrimaryResource::DataSource { .. } => ResourceKind::DataSource,
            PrimaryResource::ModelConfig { .. } => ResourceKind::ModelConfig,
            PrimaryResource::RemoteServer { .. } => ResourceKind::RemoteServer,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            PrimaryResource::Agent { metadata, .. }
            | PrimaryResource::DataSource { metadata, .. }
            | PrimaryResource::ModelConfig { metadata, .. }
            | PrimaryResource::RemoteServer { metadata, .. } => metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        match self {
            PrimaryResource::Agent { metadata, .. }
            | PrimaryResource::DataSource { metadata, .. }
            | PrimaryResource::ModelConfig { metadata, .. }
            | PrimaryResource::RemoteServer { metadata, .. } => metadata,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.metadata().key
    }

    pub fn uid(&self) -> Uid {
        self.metadata().uid
    }

    pub fn generation(&self) -> Generation {
        self.metadata().generation
    }

    /// Secret references the resource's spec depends on, used to maintain the
    /// secret reverse index and to compute the credential digest.
    pub fn secret_refs(&self) -> Vec<SecretReference> {
        match self {
            PrimaryResource::Agent { .. } => Vec::new(),
            PrimaryResource::DataSource { spec, .. } => spec.secret_refs(),
            PrimaryResource::ModelConfig { spec, .. } => spec.secret_refs(),
            PrimaryResource::RemoteServer { spec, .. } => spec.secret_refs(),
        }
    }

    /// Conditions recorded on the resource's status.
    pub fn conditions(&self) -> &[Condition] {
        match self {
            PrimaryResource::Agent { status, .. } => &status.conditions,
            PrimaryResource::DataSource { status, .. } => &status.conditions,
            PrimaryResource::ModelConfig { status, .. } => &status.conditions,
            PrimaryResource::RemoteServer { status, .. } => &status.conditions,
        }
    }
}
