//! Engine configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `TEND_`-prefixed environment variables. The loaded [`EngineConfig`] is
//! constructed once at process start and injected into every reconcile
//! invocation.

use crate::error::ReconcileError;
use crate::logging::LoggingConfig;
use crate::types::ResourceKey;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Budget for optimistic-concurrency retry loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRetry {
    /// Total attempts before the conflict is surfaced.
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl ConflictRetry {
    /// Exponential backoff, capped: base * 2^(attempt-1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    10
}

fn default_retry_max_delay_ms() -> u64 {
    250
}

/// Timeouts bounding the capability discovery exchange. Discovery is the only
/// network-timed step inside a reconcile, so both bounds are mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
        }
    }
}

impl DiscoveryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

/// Backoff applied by the watch router when a reconcile fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequeueBackoff {
    #[serde(default = "default_requeue_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_requeue_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RequeueBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: default_requeue_base_delay_ms(),
            max_delay_ms: default_requeue_max_delay_ms(),
        }
    }
}

impl RequeueBackoff {
    /// Exponential backoff for the nth consecutive failure.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

fn default_requeue_base_delay_ms() -> u64 {
    100
}

fn default_requeue_max_delay_ms() -> u64 {
    30_000
}

/// Top-level engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Client identity announced during the discovery handshake.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,

    /// ModelConfig used by agents whose spec names none.
    #[serde(default)]
    pub default_model_config: Option<ResourceKey>,

    /// Image run by generated connector workloads, without tag.
    #[serde(default = "default_workload_image")]
    pub workload_image: String,
    #[serde(default = "default_workload_image_tag")]
    pub workload_image_tag: String,

    /// Image run by generated agent runtime workloads, without tag.
    #[serde(default = "default_runtime_image")]
    pub runtime_image: String,
    #[serde(default = "default_runtime_image_tag")]
    pub runtime_image_tag: String,

    #[serde(default)]
    pub conflict_retry: ConflictRetry,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub requeue: RequeueBackoff,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            client_version: default_client_version(),
            default_model_config: None,
            workload_image: default_workload_image(),
            workload_image_tag: default_workload_image_tag(),
            runtime_image: default_runtime_image(),
            runtime_image_tag: default_runtime_image_tag(),
            conflict_retry: ConflictRetry::default(),
            discovery: DiscoveryConfig::default(),
            requeue: RequeueBackoff::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_client_name() -> String {
    "tend-controller".to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_workload_image() -> String {
    "registry.example.com/tend/connector-mcp".to_string()
}

fn default_workload_image_tag() -> String {
    "latest".to_string()
}

fn default_runtime_image() -> String {
    "registry.example.com/tend/agent-runtime".to_string()
}

fn default_runtime_image_tag() -> String {
    "latest".to_string()
}

impl EngineConfig {
    /// Load configuration with precedence: defaults, optional file,
    /// `TEND_`-prefixed environment variables (`TEND_CLIENT_NAME`, ...).
    pub fn load(file: Option<&Path>) -> Result<Self, ReconcileError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }
        builder = builder.add_source(config::Environment::with_prefix("TEND").separator("__"));
        let settings = builder
            .build()
            .map_err(|e| ReconcileError::Config(format!("failed to load config: {e}")))?;
        settings
            .try_deserialize()
            .map_err(|e| ReconcileError::Config(format!("invalid config: {e}")))
    }

    /// Full connector workload image reference.
    pub fn workload_image_ref(&self) -> String {
        format!("{}:{}", self.workload_image, self.workload_image_tag)
    }

    /// Full agent runtime image reference.
    pub fn runtime_image_ref(&self) -> String {
        format!("{}:{}", self.runtime_image, self.runtime_image_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.client_name, "tend-controller");
        assert!(cfg.conflict_retry.attempts >= 3);
        assert!(cfg.discovery.rpc_timeout() > Duration::ZERO);
    }

    #[test]
    fn test_conflict_backoff_grows_and_caps() {
        let retry = ConflictRetry {
            attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 50,
        };
        assert_eq!(retry.delay_for(1), Duration::from_millis(10));
        assert_eq!(retry.delay_for(2), Duration::from_millis(20));
        assert_eq!(retry.delay_for(3), Duration::from_millis(40));
        assert_eq!(retry.delay_for(4), Duration::from_millis(50));
        assert_eq!(retry.delay_for(10), Duration::from_millis(50));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
client_name = "custom-controller"

[conflict_retry]
attempts = 7

[discovery]
rpc_timeout_secs = 5
"#
        )
        .unwrap();

        let cfg = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.client_name, "custom-controller");
        assert_eq!(cfg.conflict_retry.attempts, 7);
        assert_eq!(cfg.discovery.rpc_timeout_secs, 5);
        // Unset fields fall back to defaults.
        assert_eq!(cfg.discovery.connect_timeout_secs, 10);
    }

    #[test]
    fn test_workload_image_ref() {
        let cfg = EngineConfig::default();
        assert!(cfg.workload_image_ref().contains(':'));
    }
}
