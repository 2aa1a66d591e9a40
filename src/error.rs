//! Error taxonomy for the reconciliation engine.
//!
//! Kind-specific reconcile bodies return a single (possibly aggregate)
//! [`ReconcileError`] to the dispatcher; the dispatcher always runs the status
//! write with that error before returning, so failures surface as condition
//! reason/message on the resource rather than as process-level faults.

use crate::types::{OwnedKind, ResourceKey, ResourceKind};
use thiserror::Error;

/// Errors from the resource store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("{what} not found")]
    NotFound { what: String },

    /// Optimistic-concurrency collision: the object revision advanced between
    /// read and write.
    #[error("conflict writing {what}: revision {expected} is stale")]
    Conflict { what: String, expected: u64 },

    /// The store rejected the write as malformed.
    #[error("invalid write: {0}")]
    InvalidWrite(String),

    /// The watch channel is closed or lagging beyond recovery.
    #[error("watch stream closed")]
    WatchClosed,
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound { what: what.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Errors from the durable catalog side index.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Db(#[from] sled::Error),

    #[error("failed to encode catalog record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from the capability discovery client.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("server speaks unsupported protocol version {0}")]
    UnsupportedVersion(String),

    #[error("{method} call failed: {reason}")]
    Rpc { method: String, reason: String },

    #[error("discovery timed out during {phase}")]
    Timeout { phase: String },

    #[error("malformed server response: {0}")]
    Protocol(String),
}

impl DiscoveryError {
    pub fn rpc(method: impl Into<String>, reason: impl Into<String>) -> Self {
        DiscoveryError::Rpc {
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(phase: impl Into<String>) -> Self {
        DiscoveryError::Timeout {
            phase: phase.into(),
        }
    }
}

/// Top-level error for one reconcile pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Malformed spec. Fatal for this pass; retried only when a later event
    /// changes the inputs.
    #[error("invalid spec: {0}")]
    Validation(String),

    /// Bad engine configuration, fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A referenced secret (or a key within it) is missing.
    #[error("credentials secret {secret}: {detail}")]
    MissingSecret { secret: ResourceKey, detail: String },

    /// A referenced sibling resource is missing.
    #[error("{kind} {key} not found")]
    MissingDependency { kind: ResourceKind, key: ResourceKey },

    /// Optimistic-concurrency retries exhausted for one owned object.
    #[error("giving up on {kind} {name} after {attempts} conflicting writes")]
    Conflict {
        kind: OwnedKind,
        name: String,
        attempts: u32,
    },

    /// Capability discovery failed; non-fatal to the reconcile when a
    /// last-known-good snapshot is available.
    #[error(transparent)]
    Transport(#[from] DiscoveryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Several independent failures joined into one error, surfaced once.
    #[error("{0}")]
    Aggregate(AggregateError),
}

impl ReconcileError {
    /// Whether this error indicates missing or invalid credentials, which
    /// drives the Connected condition rather than Ready.
    pub fn is_credential(&self) -> bool {
        match self {
            ReconcileError::MissingSecret { .. } => true,
            ReconcileError::Aggregate(agg) => agg.0.iter().any(|e| e.is_credential()),
            _ => false,
        }
    }

    /// Join a list of errors into a single error, or None when empty.
    pub fn join(errs: Vec<ReconcileError>) -> Option<ReconcileError> {
        match errs.len() {
            0 => None,
            1 => errs.into_iter().next(),
            _ => Some(ReconcileError::Aggregate(AggregateError(errs))),
        }
    }
}

/// A list of failures collected across one pass, e.g. per-object pruning
/// deletions, reported as a single error.
#[derive(Debug)]
pub struct AggregateError(pub Vec<ReconcileError>);

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&parts.join("; "))
    }
}
