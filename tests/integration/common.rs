//! Shared fixtures: an engine over a fresh in-memory store, with discovery
//! transports answering from a per-test script.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tend::catalog::Catalog;
use tend::config::EngineConfig;
use tend::discovery::{CapabilityTransport, TransportFactory, SUPPORTED_PROTOCOL_VERSIONS};
use tend::error::DiscoveryError;
use tend::reconcile::{Engine, EngineState};
use tend::resource::remote::RemoteServerSpec;
use tend::resource::{
    AgentSpec, AgentStatus, DataSourceProvider, DataSourceSpec, DataSourceStatus, HeaderFromSecret,
    Metadata, ModelConfigSpec, ModelConfigStatus, PrimaryResource, RemoteProtocol,
    RemoteServerStatus, Secret, SemanticModelRef, WarehouseConfig,
};
use tend::store::MemoryStore;
use tend::types::ResourceKey;

/// What one scripted discovery attempt should produce.
#[derive(Clone)]
pub enum Discovery {
    Tools(Vec<(&'static str, &'static str)>),
    Unreachable,
}

/// Factory handing out one scripted transport per discovery attempt, in
/// order. Attempts beyond the script are unreachable.
pub struct ScriptedTransports {
    script: Mutex<VecDeque<Discovery>>,
}

impl ScriptedTransports {
    pub fn new(script: Vec<Discovery>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }
}

impl TransportFactory for ScriptedTransports {
    fn create(
        &self,
        _spec: &RemoteServerSpec,
        _headers: Vec<(String, String)>,
    ) -> Box<dyn CapabilityTransport> {
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(Discovery::Unreachable);
        Box::new(ScriptedTransport { outcome })
    }
}

struct ScriptedTransport {
    outcome: Discovery,
}

#[async_trait]
impl CapabilityTransport for ScriptedTransport {
    async fn start(&mut self) -> Result<(), DiscoveryError> {
        match self.outcome {
            Discovery::Unreachable => Err(DiscoveryError::Connect {
                url: "http://tools.default:8080/mcp".into(),
                reason: "connection refused".into(),
            }),
            _ => Ok(()),
        }
    }

    async fn request(&mut self, method: &str, _params: Value) -> Result<Value, DiscoveryError> {
        match (&self.outcome, method) {
            (Discovery::Tools(_), "initialize") => Ok(json!({
                "protocolVersion": SUPPORTED_PROTOCOL_VERSIONS[0],
                "serverInfo": {"name": "scripted", "version": "1.0"},
            })),
            (Discovery::Tools(tools), "tools/list") => {
                let entries: Vec<Value> = tools
                    .iter()
                    .map(|(name, description)| json!({"name": name, "description": description}))
                    .collect();
                Ok(json!({ "tools": entries }))
            }
            _ => Err(DiscoveryError::rpc(method, "unexpected call")),
        }
    }

    async fn notify(&mut self, _method: &str, _params: Value) -> Result<(), DiscoveryError> {
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub engine: Engine,
}

/// Engine over a fresh store, ephemeral catalog, and the given discovery
/// script. Retry delays are shortened so conflict paths stay fast.
pub fn engine_with(script: Vec<Discovery>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let catalog = Catalog::open_ephemeral().expect("ephemeral catalog");
    let mut config = EngineConfig::default();
    config.conflict_retry.base_delay_ms = 1;
    config.conflict_retry.max_delay_ms = 4;
    let state = Arc::new(EngineState::with_transports(
        config,
        catalog,
        ScriptedTransports::new(script),
    ));
    Harness {
        store: store.clone(),
        engine: Engine::new(store, state),
    }
}

pub fn key(name: &str) -> ResourceKey {
    ResourceKey::new("default", name)
}

pub fn secret(name: &str, entry_key: &str, value: &str) -> Secret {
    Secret::new(key(name)).with_entry(entry_key, value)
}

pub fn datasource(name: &str, secret_name: &str) -> PrimaryResource {
    PrimaryResource::DataSource {
        metadata: Metadata::new(key(name)),
        spec: DataSourceSpec {
            provider: DataSourceProvider::Warehouse,
            warehouse: Some(WarehouseConfig {
                workspace_url: "https://analytics.example.com".into(),
                credentials_secret_ref: secret_name.into(),
                credentials_secret_key: "token".into(),
                catalog: "c1".into(),
                schema: Some("s1".into()),
                warehouse_id: Some("wh-1".into()),
            }),
            semantic_models: vec![SemanticModelRef {
                name: "revenue".into(),
                description: None,
            }],
        },
        status: DataSourceStatus::default(),
    }
}

pub fn model_config(name: &str, secret_name: &str) -> PrimaryResource {
    PrimaryResource::ModelConfig {
        metadata: Metadata::new(key(name)),
        spec: ModelConfigSpec {
            model: "gpt-4.1".into(),
            provider: "openai".into(),
            api_key_secret_ref: secret_name.into(),
            api_key_secret_key: "api-key".into(),
            tls: None,
        },
        status: ModelConfigStatus::default(),
    }
}

pub fn agent(name: &str, model_config: &str) -> PrimaryResource {
    PrimaryResource::Agent {
        metadata: Metadata::new(key(name)),
        spec: AgentSpec {
            description: "integration test agent".into(),
            model_config: model_config.into(),
            system_prompt: "You are helpful.".into(),
            tool_servers: vec!["sales-mcp".into()],
        },
        status: AgentStatus::default(),
    }
}

pub fn remote_server(name: &str, headers_from: Vec<HeaderFromSecret>) -> PrimaryResource {
    PrimaryResource::RemoteServer {
        metadata: Metadata::new(key(name)),
        spec: RemoteServerSpec {
            description: "external tools".into(),
            protocol: RemoteProtocol::StreamableHttp,
            url: "http://tools.default:8080/mcp".into(),
            headers_from,
            timeout_secs: None,
        },
        status: RemoteServerStatus::default(),
    }
}
