//! Desired-state generation for DataSource resources.
//!
//! A DataSource materializes into three owned objects named `"{name}-mcp"`:
//! a workload running the connector in HTTP mode, an endpoint fronting it,
//! and a registration advertising the endpoint to agents.

use super::{Generator, SiblingLookup};
use crate::error::ReconcileError;
use crate::manifest::{
    EndpointManifest, EnvValue, EnvVar, OwnedManifest, RegistrationManifest, WorkloadManifest,
};
use crate::resource::remote::RemoteProtocol;
use crate::resource::{PrimaryResource, SecretReference, WarehouseConfig};
use std::collections::BTreeMap;

const SERVER_PORT: u16 = 8080;

pub struct DataSourceGenerator {
    image: String,
}

impl DataSourceGenerator {
    pub fn new(image: String) -> Self {
        Self { image }
    }

    fn labels(name: &str, provider: &str) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("tend.dev/datasource".to_string(), name.to_string());
        labels.insert("tend.dev/provider".to_string(), provider.to_string());
        labels.insert("tend.dev/component".to_string(), "mcp-server".to_string());
        labels
    }

    fn connector_args(
        config: &WarehouseConfig,
        warehouse_id: Option<&str>,
        models: &[String],
    ) -> Vec<String> {
        let mut args = vec![
            "--transport=streamable-http".to_string(),
            format!("--port={SERVER_PORT}"),
            format!("--workspace-url={}", config.workspace_url),
            format!("--catalog={}", config.catalog),
        ];
        if let Some(schema) = &config.schema {
            args.push(format!("--schema={schema}"));
        }
        if let Some(id) = warehouse_id {
            args.push(format!("--warehouse-id={id}"));
        }
        if !models.is_empty() {
            args.push(format!("--models={}", models.join(",")));
        }
        args
    }
}

impl Generator for DataSourceGenerator {
    fn generate(
        &self,
        resource: &PrimaryResource,
        siblings: &dyn SiblingLookup,
    ) -> Result<Vec<OwnedManifest>, ReconcileError> {
        let (metadata, spec) = match resource {
            PrimaryResource::DataSource { metadata, spec, .. } => (metadata, spec),
            other => {
                return Err(ReconcileError::Validation(format!(
                    "datasource generator invoked for {}",
                    other.kind()
                )))
            }
        };
        let config = spec.warehouse.as_ref().ok_or_else(|| {
            ReconcileError::Validation(format!(
                "provider {} requires a warehouse config",
                spec.provider.as_str()
            ))
        })?;

        let server_name = format!("{}-mcp", metadata.key.name);
        let labels = Self::labels(&metadata.key.name, spec.provider.as_str());

        // A spec without its own warehouse id may borrow one from a sibling
        // connection of the same provider.
        let sibling_config;
        let warehouse_id = match &config.warehouse_id {
            Some(id) => Some(id.as_str()),
            None => {
                sibling_config = siblings.provider_config(spec.provider);
                sibling_config
                    .as_ref()
                    .and_then(|c| c.warehouse_id.as_deref())
            }
        };

        let models: Vec<String> = spec.semantic_models.iter().map(|m| m.name.clone()).collect();

        let workload = WorkloadManifest {
            name: server_name.clone(),
            labels: labels.clone(),
            replicas: 1,
            image: self.image.clone(),
            args: Self::connector_args(config, warehouse_id, &models),
            env: vec![EnvVar {
                name: "WAREHOUSE_TOKEN".to_string(),
                value: EnvValue::FromSecret(SecretReference {
                    name: config.credentials_secret_ref.clone(),
                    key: config.credentials_secret_key.clone(),
                }),
            }],
            health_path: "/health".to_string(),
            port: SERVER_PORT,
        };

        let endpoint = EndpointManifest {
            name: server_name.clone(),
            labels: labels.clone(),
            selector: labels.clone(),
            port: SERVER_PORT,
            cluster_address: None,
        };

        let registration = RegistrationManifest {
            name: server_name.clone(),
            labels,
            protocol: RemoteProtocol::StreamableHttp,
            url: format!(
                "http://{}.{}:{}/mcp",
                server_name, metadata.key.namespace, SERVER_PORT
            ),
            description: format!(
                "Auto-generated tool endpoint for DataSource {} ({})",
                metadata.key.name,
                spec.provider.as_str()
            ),
        };

        Ok(vec![
            OwnedManifest::Workload(workload),
            OwnedManifest::Endpoint(endpoint),
            OwnedManifest::Registration(registration),
        ])
    }
}
