//! Core identity types shared across the reconciliation engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key identifying a namespaced resource: (namespace, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for a sibling object in the same namespace.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self {
            namespace: self.namespace.clone(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Store-assigned unique identity of a stored object.
///
/// Unlike a [`ResourceKey`], a Uid is never reused: deleting and recreating a
/// resource under the same key yields a different Uid. Owner relationships
/// bind to Uids so a stale child can never be adopted by a newer owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(pub u64);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid-{}", self.0)
    }
}

/// Spec revision counter. Incremented by the store on every spec edit,
/// never on status edits.
pub type Generation = i64;

/// Kinds of user-declared primary resources the engine reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Agent,
    DataSource,
    ModelConfig,
    RemoteServer,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Agent => "Agent",
            ResourceKind::DataSource => "DataSource",
            ResourceKind::ModelConfig => "ModelConfig",
            ResourceKind::RemoteServer => "RemoteServer",
        }
    }

    /// All reconcilable kinds, in registration order.
    pub fn all() -> [ResourceKind; 4] {
        [
            ResourceKind::Agent,
            ResourceKind::DataSource,
            ResourceKind::ModelConfig,
            ResourceKind::RemoteServer,
        ]
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of dependent objects the engine creates on behalf of a primary
/// resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OwnedKind {
    Workload,
    Endpoint,
    Registration,
}

impl OwnedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnedKind::Workload => "Workload",
            OwnedKind::Endpoint => "Endpoint",
            OwnedKind::Registration => "Registration",
        }
    }
}

impl fmt::Display for OwnedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
