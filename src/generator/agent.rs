//! Desired-state generation for Agent resources.
//!
//! An agent materializes into a runtime workload and its endpoint, both named
//! `"{name}-runtime"`.

use super::{Generator, SiblingLookup};
use crate::error::ReconcileError;
use crate::manifest::{EndpointManifest, EnvValue, EnvVar, OwnedManifest, WorkloadManifest};
use crate::resource::PrimaryResource;
use std::collections::BTreeMap;

const RUNTIME_PORT: u16 = 8080;

pub struct AgentGenerator {
    image: String,
}

impl AgentGenerator {
    pub fn new(image: String) -> Self {
        Self { image }
    }
}

impl Generator for AgentGenerator {
    fn generate(
        &self,
        resource: &PrimaryResource,
        _siblings: &dyn SiblingLookup,
    ) -> Result<Vec<OwnedManifest>, ReconcileError> {
        let (metadata, spec) = match resource {
            PrimaryResource::Agent { metadata, spec, .. } => (metadata, spec),
            other => {
                return Err(ReconcileError::Validation(format!(
                    "agent generator invoked for {}",
                    other.kind()
                )))
            }
        };

        let runtime_name = format!("{}-runtime", metadata.key.name);
        let mut labels = BTreeMap::new();
        labels.insert("tend.dev/agent".to_string(), metadata.key.name.clone());
        labels.insert("tend.dev/component".to_string(), "agent-runtime".to_string());

        let workload = WorkloadManifest {
            name: runtime_name.clone(),
            labels: labels.clone(),
            replicas: 1,
            image: self.image.clone(),
            args: vec![format!("--port={RUNTIME_PORT}")],
            env: vec![
                EnvVar {
                    name: "AGENT_ID".to_string(),
                    value: EnvValue::Literal(metadata.key.to_string()),
                },
                EnvVar {
                    name: "MODEL_CONFIG".to_string(),
                    value: EnvValue::Literal(spec.model_config.clone()),
                },
            ],
            health_path: "/health".to_string(),
            port: RUNTIME_PORT,
        };

        let endpoint = EndpointManifest {
            name: runtime_name,
            labels: labels.clone(),
            selector: labels,
            port: RUNTIME_PORT,
            cluster_address: None,
        };

        Ok(vec![
            OwnedManifest::Workload(workload),
            OwnedManifest::Endpoint(endpoint),
        ])
    }
}
