//! Owned-object manifests emitted by desired-state generators.
//!
//! Manifests are plain values: deterministic field ordering (BTreeMap labels)
//! so an unchanged spec yields byte-identical output across calls. Fields the
//! store assigns after creation (an endpoint's cluster address) live here too
//! but are excluded from semantic comparison and carried forward on update.

use crate::resource::remote::RemoteProtocol;
use crate::resource::SecretReference;
use crate::types::{OwnedKind, ResourceKey, ResourceKind, Uid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Exclusive owner relationship carried by every owned object. The store
/// cascade-deletes children when the owner uid disappears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: ResourceKind,
    pub key: ResourceKey,
    pub uid: Uid,
}

/// An environment variable for a workload container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: EnvValue,
}

/// Environment variable sources. Secret-backed values are resolved by the
/// workload runtime, never by the engine, so credentials stay out of
/// manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvValue {
    Literal(String),
    FromSecret(SecretReference),
}

/// A compute workload running one container image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadManifest {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub replicas: i32,
    pub image: String,
    pub args: Vec<String>,
    pub env: Vec<EnvVar>,
    /// HTTP path probed for liveness/readiness.
    pub health_path: String,
    pub port: u16,
}

/// A network endpoint selecting workload instances by label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointManifest {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub selector: BTreeMap<String, String>,
    pub port: u16,
    /// Assigned by the store on creation. Never set by generators; always
    /// carried forward on update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_address: Option<String>,
}

/// A registration advertising a tool endpoint to agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationManifest {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub protocol: RemoteProtocol,
    pub url: String,
    pub description: String,
}

/// A manifest for one owned object, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum OwnedManifest {
    Workload(WorkloadManifest),
    Endpoint(EndpointManifest),
    Registration(RegistrationManifest),
}

impl OwnedManifest {
    pub fn kind(&self) -> OwnedKind {
        match self {
            OwnedManifest::Workload(_) => OwnedKind::Workload,
            OwnedManifest::Endpoint(_) => OwnedKind::Endpoint,
            OwnedManifest::Registration(_) => OwnedKind::Registration,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            OwnedManifest::Workload(m) => &m.name,
            OwnedManifest::Endpoint(m) => &m.name,
            OwnedManifest::Registration(m) => &m.name,
        }
    }

    /// Semantic inequality check that ignores store-assigned fields, so a
    /// second pass over an unchanged spec issues zero writes.
    pub fn semantic_eq(&self, other: &OwnedManifest) -> bool {
        match (self, other) {
            (OwnedManifest::Endpoint(a), OwnedManifest::Endpoint(b)) => {
                let mut a = a.clone();
                let mut b = b.clone();
                a.cluster_address = None;
                b.cluster_address = None;
                a == b
            }
            (a, b) => a == b,
        }
    }

    /// Copy store-assigned fields from `existing` into this manifest before
    /// writing, so an update never blanks them.
    pub fn carry_forward(&mut self, existing: &OwnedManifest) {
        if let (OwnedManifest::Endpoint(desired), OwnedManifest::Endpoint(current)) =
            (self, existing)
        {
            desired.cluster_address = current.cluster_address.clone();
        }
    }
}
