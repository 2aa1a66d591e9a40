//! Reconcile dispatcher.
//!
//! Maps a (kind, key) request to the registered kind body. Every body follows
//! the same shape: fetch the resource; when absent, run the deletion path
//! (clear derived bookkeeping) and return; otherwise reconcile and hand the
//! result — success or error — to the status writer before returning. A
//! mid-reconcile error never skips the status write.

pub mod agent;
pub mod datasource;
pub mod modelconfig;
pub mod remote;

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::discovery::{ClientInfo, HttpTransportFactory, TransportFactory};
use crate::error::ReconcileError;
use crate::generator::GeneratorRegistry;
use crate::index::SecretIndex;
use crate::store::ResourceStore;
use crate::types::{ResourceKey, ResourceKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

pub use agent::AgentReconciler;
pub use datasource::DataSourceReconciler;
pub use modelconfig::ModelConfigReconciler;
pub use remote::RemoteServerReconciler;

/// Shared engine state, constructed once at process start and injected into
/// every reconcile invocation.
pub struct EngineState {
    pub config: EngineConfig,
    pub catalog: Arc<Catalog>,
    pub secret_index: SecretIndex,
    pub transports: Arc<dyn TransportFactory>,
}

impl EngineState {
    pub fn new(config: EngineConfig, catalog: Arc<Catalog>) -> Self {
        let transports = Arc::new(HttpTransportFactory::new(config.discovery.clone()));
        Self::with_transports(config, catalog, transports)
    }

    /// State with a custom transport factory, used by tests to script
    /// discovery outcomes.
    pub fn with_transports(
        config: EngineConfig,
        catalog: Arc<Catalog>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            config,
            catalog,
            secret_index: SecretIndex::new(),
            transports,
        }
    }

    /// Identity announced in the discovery handshake.
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            name: self.config.client_name.clone(),
            version: self.config.client_version.clone(),
        }
    }
}

/// Everything a kind body needs for one invocation.
pub struct ReconcileContext {
    pub store: Arc<dyn ResourceStore>,
    pub state: Arc<EngineState>,
    pub generators: Arc<GeneratorRegistry>,
}

/// One resource kind's reconcile entry point.
#[async_trait]
pub trait KindReconciler: Send + Sync {
    async fn reconcile(
        &self,
        cx: &ReconcileContext,
        key: &ResourceKey,
    ) -> Result<(), ReconcileError>;
}

/// The engine: a registry of kind bodies over shared context. Adding a kind
/// means registering an entry.
pub struct Engine {
    context: ReconcileContext,
    kinds: HashMap<ResourceKind, Arc<dyn KindReconciler>>,
}

impl Engine {
    /// Engine with the built-in kind bodies registered.
    pub fn new(store: Arc<dyn ResourceStore>, state: Arc<EngineState>) -> Self {
        let generators = Arc::new(GeneratorRegistry::with_defaults(&state.config));
        let mut engine = Self {
            context: ReconcileContext {
                store,
                state,
                generators,
            },
            kinds: HashMap::new(),
        };
        engine.register(ResourceKind::Agent, Arc::new(AgentReconciler));
        engine.register(ResourceKind::DataSource, Arc::new(DataSourceReconciler));
        engine.register(ResourceKind::ModelConfig, Arc::new(ModelConfigReconciler));
        engine.register(ResourceKind::RemoteServer, Arc::new(RemoteServerReconciler));
        engine
    }

    pub fn register(&mut self, kind: ResourceKind, body: Arc<dyn KindReconciler>) {
        self.kinds.insert(kind, body);
    }

    pub fn context(&self) -> &ReconcileContext {
        &self.context
    }

    /// Run one reconcile for the given kind and key.
    pub async fn reconcile(
        &self,
        kind: ResourceKind,
        key: &ResourceKey,
    ) -> Result<(), ReconcileError> {
        let body = self.kinds.get(&kind).ok_or_else(|| {
            ReconcileError::Validation(format!("no reconciler registered for kind {kind}"))
        })?;
        debug!(kind = %kind, key = %key, "reconciling");
        let result = body.reconcile(&self.context, key).await;
        if let Err(err) = &result {
            error!(kind = %kind, key = %key, error = %err, "reconcile failed");
        }
        result
    }
}
