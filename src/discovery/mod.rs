//! Capability discovery client.
//!
//! Performs the versioned handshake with a remote tool endpoint, then lists
//! the capabilities it currently exposes. Both steps are bounded by the
//! configured RPC timeout; a timeout is a discovery failure, never
//! reconcile-fatal, and the caller falls back to the last-known-good
//! snapshot in the catalog.

pub mod transport;

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::resource::remote::DiscoveredCapability;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub use transport::{
    CapabilityTransport, EventStreamDecoder, HttpTransportFactory, SseTransport,
    StreamableHttpTransport, TransportFactory,
};

/// Protocol versions this client can speak, newest first. The handshake
/// offers the newest; a server answering with any supported version is
/// accepted.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];

/// Client identity announced in the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<ToolEntry>,
}

/// One discovery exchange over an established transport.
pub struct DiscoveryClient {
    transport: Box<dyn CapabilityTransport>,
    client_info: ClientInfo,
    rpc_timeout: Duration,
}

impl DiscoveryClient {
    pub fn new(
        transport: Box<dyn CapabilityTransport>,
        client_info: ClientInfo,
        config: &DiscoveryConfig,
    ) -> Self {
        Self {
            transport,
            client_info,
            rpc_timeout: config.rpc_timeout(),
        }
    }

    async fn call(&mut self, method: &str, params: Value) -> Result<Value, DiscoveryError> {
        tokio::time::timeout(self.rpc_timeout, self.transport.request(method, params))
            .await
            .map_err(|_| DiscoveryError::timeout(method))?
    }

    /// Versioned handshake: exchange identity and protocol version, then
    /// acknowledge with the initialized notification.
    pub async fn initialize(&mut self) -> Result<(), DiscoveryError> {
        tokio::time::timeout(self.rpc_timeout, self.transport.start())
            .await
            .map_err(|_| DiscoveryError::timeout("connect"))??;

        let params = serde_json::json!({
            "protocolVersion": SUPPORTED_PROTOCOL_VERSIONS[0],
            "capabilities": {},
            "clientInfo": self.client_info,
        });
        let result = self.call("initialize", params).await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| DiscoveryError::Handshake(e.to_string()))?;
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&init.protocol_version.as_str()) {
            return Err(DiscoveryError::UnsupportedVersion(init.protocol_version));
        }

        self.transport
            .notify("notifications/initialized", serde_json::json!({}))
            .await?;
        Ok(())
    }

    /// List the capabilities the endpoint currently exposes, in server order.
    pub async fn list_capabilities(&mut self) -> Result<Vec<DiscoveredCapability>, DiscoveryError> {
        let result = self.call("tools/list", serde_json::json!({})).await?;
        let listing: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| DiscoveryError::Protocol(e.to_string()))?;
        Ok(listing
            .tools
            .into_iter()
            .map(|t| DiscoveredCapability {
                name: t.name,
                description: t.description,
            })
            .collect())
    }

    /// Handshake then list, the full exchange one reconcile performs.
    pub async fn discover(mut self) -> Result<Vec<DiscoveredCapability>, DiscoveryError> {
        self.initialize().await?;
        self.list_capabilities().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Transport answering from a script of canned responses.
    pub struct ScriptedTransport {
        pub responses: VecDeque<Result<Value, DiscoveryError>>,
        pub calls: Vec<String>,
        pub delay: Option<Duration>,
    }

    impl ScriptedTransport {
        pub fn new(responses: Vec<Result<Value, DiscoveryError>>) -> Self {
            Self {
                responses: responses.into(),
                calls: Vec::new(),
                delay: None,
            }
        }

        /// A transport that completes a healthy handshake and then lists the
        /// given tools.
        pub fn healthy(tools: &[(&str, &str)]) -> Self {
            let tool_values: Vec<Value> = tools
                .iter()
                .map(|(name, description)| {
                    serde_json::json!({"name": name, "description": description})
                })
                .collect();
            Self::new(vec![
                Ok(serde_json::json!({
                    "protocolVersion": SUPPORTED_PROTOCOL_VERSIONS[0],
                    "serverInfo": {"name": "scripted", "version": "1.0"},
                })),
                Ok(serde_json::json!({ "tools": tool_values })),
            ])
        }
    }

    #[async_trait]
    impl CapabilityTransport for ScriptedTransport {
        async fn start(&mut self) -> Result<(), DiscoveryError> {
            Ok(())
        }

        async fn request(&mut self, method: &str, _params: Value) -> Result<Value, DiscoveryError> {
            self.calls.push(method.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(DiscoveryError::rpc(method, "script exhausted")))
        }

        async fn notify(&mut self, method: &str, _params: Value) -> Result<(), DiscoveryError> {
            self.calls.push(format!("notify:{method}"));
            Ok(())
        }
    }
}
