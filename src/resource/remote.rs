//! RemoteServer resource: a registration of a remote tool endpoint whose
//! capability set is discovered over a versioned protocol.

use crate::resource::condition::Condition;
use crate::resource::SecretReference;
use crate::types::Generation;
use serde::{Deserialize, Serialize};

/// Transport binding used to reach the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteProtocol {
    /// Request/response over a single streamable HTTP endpoint.
    StreamableHttp,
    /// Request/response layered on a server-push event stream.
    Sse,
}

impl Default for RemoteProtocol {
    fn default() -> Self {
        RemoteProtocol::StreamableHttp
    }
}

/// A request header whose value is resolved from a secret at discovery time.
/// Secret contents never land in spec or status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderFromSecret {
    pub header: String,
    pub secret_ref: SecretReference,
}

/// Desired state of a RemoteServer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteServerSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub protocol: RemoteProtocol,
    pub url: String,
    /// Headers resolved from secrets, e.g. an Authorization bearer token.
    #[serde(default)]
    pub headers_from: Vec<HeaderFromSecret>,
    /// Per-call timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl RemoteServerSpec {
    pub fn secret_refs(&self) -> Vec<SecretReference> {
        self.headers_from
            .iter()
            .map(|h| h.secret_ref.clone())
            .collect()
    }
}

/// A capability exposed by the remote endpoint, as last discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredCapability {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Observed state of a RemoteServer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteServerStatus {
    #[serde(default)]
    pub observed_generation: Generation,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Capability snapshot. Replaced whole on successful discovery; left
    /// untouched on failure so a transient outage never empties it.
    #[serde(default)]
    pub discovered_capabilities: Vec<DiscoveredCapability>,
}
