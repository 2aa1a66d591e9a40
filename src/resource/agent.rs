//! Agent resource: a declarative agent definition bound to a model
//! configuration and a set of tool endpoints.

use crate::resource::condition::Condition;
use crate::types::Generation;
use serde::{Deserialize, Serialize};

/// Desired state of an Agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    #[serde(default)]
    pub description: String,
    /// Name of a sibling ModelConfig. When empty, the engine-wide default is
    /// used if configured.
    #[serde(default)]
    pub model_config: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Names of sibling RemoteServer resources whose capabilities the agent
    /// may call.
    #[serde(default)]
    pub tool_servers: Vec<String>,
}

/// Observed state of an Agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    #[serde(default)]
    pub observed_generation: Generation,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Name of the generated runtime workload, `"{name}-runtime"`.
    #[serde(default)]
    pub generated_workload: String,
}
