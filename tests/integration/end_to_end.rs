//! Full lifecycle coverage: create, rotate credentials, delete.

use crate::common::{self, key};
use anyhow::Result;
use tend::digest;
use tend::manifest::OwnedManifest;
use tend::resource::condition::{find_condition, is_condition_true, types as condition_types};
use tend::resource::{PrimaryResource, SecretReference};
use tend::store::ResourceStore;
use tend::types::{OwnedKind, ResourceKind};

fn datasource_status(resource: PrimaryResource) -> tend::resource::DataSourceStatus {
    match resource {
        PrimaryResource::DataSource { status, .. } => status,
        other => panic!("expected a DataSource, got {}", other.kind()),
    }
}

#[tokio::test]
async fn test_datasource_lifecycle() -> Result<()> {
    let h = common::engine_with(Vec::new());
    h.store.put_secret(common::secret("s", "token", "abc"))?;
    let created = h.store.create_resource(common::datasource("a", "s"))?;

    h.engine
        .reconcile(ResourceKind::DataSource, &key("a"))
        .await?;

    // The generated trio exists, all named "a-mcp", registration pointing at
    // the endpoint.
    let owned = h.store.list_owned_by(created.uid())?;
    assert_eq!(owned.len(), 3);
    assert!(owned.iter().all(|obj| obj.name() == "a-mcp"));
    let registration = owned
        .iter()
        .find_map(|obj| match &obj.manifest {
            OwnedManifest::Registration(r) => Some(r),
            _ => None,
        })
        .expect("registration manifest");
    assert_eq!(registration.url, "http://a-mcp.default:8080/mcp");

    let expected_hash = digest::digest_secret_refs(
        h.store.as_ref(),
        "default",
        &[SecretReference {
            name: "s".into(),
            key: "token".into(),
        }],
    )?;
    let status = datasource_status(
        h.store
            .get_resource(ResourceKind::DataSource, &key("a"))?
            .expect("datasource present"),
    );
    assert!(is_condition_true(&status.conditions, condition_types::CONNECTED));
    assert!(is_condition_true(&status.conditions, condition_types::READY));
    assert_eq!(status.generated_server, "a-mcp");
    assert_eq!(status.secret_hash, expected_hash);
    assert_eq!(status.observed_generation, 1);

    // Rotating the credential recomputes the digest and re-applies exactly
    // the workload, whose digest label changed.
    let writes_before = h.store.owned_write_count();
    h.store.put_secret(common::secret("s", "token", "xyz"))?;
    h.engine
        .reconcile(ResourceKind::DataSource, &key("a"))
        .await?;

    let rotated = datasource_status(
        h.store
            .get_resource(ResourceKind::DataSource, &key("a"))?
            .expect("datasource present"),
    );
    assert_ne!(rotated.secret_hash, expected_hash);
    assert_eq!(h.store.owned_write_count(), writes_before + 1);

    // Deletion cascades through owner references; a reconcile of the absent
    // key runs the deletion path and stays quiet.
    h.store.delete_resource(ResourceKind::DataSource, &key("a"))?;
    assert!(h.store.list_owned_by(created.uid())?.is_empty());
    h.engine
        .reconcile(ResourceKind::DataSource, &key("a"))
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_missing_credentials_reported_without_materialization() -> Result<()> {
    let h = common::engine_with(Vec::new());
    let created = h.store.create_resource(common::datasource("a", "absent"))?;

    let err = h
        .engine
        .reconcile(ResourceKind::DataSource, &key("a"))
        .await
        .unwrap_err();
    assert!(err.is_credential());

    // The failure surfaces on the resource, not as skipped status.
    let status = datasource_status(
        h.store
            .get_resource(ResourceKind::DataSource, &key("a"))?
            .expect("datasource present"),
    );
    let connected = find_condition(&status.conditions, condition_types::CONNECTED)
        .expect("connected condition");
    assert_eq!(connected.reason, "CredentialsError");
    assert!(h.store.list_owned_by(created.uid())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_agent_runtime_and_derived_config() -> Result<()> {
    let h = common::engine_with(Vec::new());
    h.store
        .put_secret(common::secret("openai-key", "api-key", "abc"))?;
    h.store.create_resource(common::model_config("gpt", "openai-key"))?;
    h.engine
        .reconcile(ResourceKind::ModelConfig, &key("gpt"))
        .await?;

    let model_status = match h
        .store
        .get_resource(ResourceKind::ModelConfig, &key("gpt"))?
        .expect("model config present")
    {
        PrimaryResource::ModelConfig { status, .. } => status,
        _ => unreachable!(),
    };
    assert!(!model_status.secret_hash.is_empty());
    let accepted = find_condition(&model_status.conditions, condition_types::ACCEPTED)
        .expect("accepted condition");
    assert_eq!(accepted.reason, "ModelConfigReconciled");

    let created = h.store.create_resource(common::agent("helper", "gpt"))?;
    h.engine
        .reconcile(ResourceKind::Agent, &key("helper"))
        .await?;

    let owned = h.store.list_owned_by(created.uid())?;
    assert_eq!(owned.len(), 2);
    assert!(owned.iter().all(|obj| obj.name() == "helper-runtime"));
    assert!(h
        .store
        .get_owned(OwnedKind::Workload, &key("helper-runtime"))?
        .is_some());

    let agent_status = match h
        .store
        .get_resource(ResourceKind::Agent, &key("helper"))?
        .expect("agent present")
    {
        PrimaryResource::Agent { status, .. } => status,
        _ => unreachable!(),
    };
    assert!(is_condition_true(&agent_status.conditions, condition_types::READY));
    assert_eq!(agent_status.generated_workload, "helper-runtime");

    // The derived runtime config is cached for the API surface and dropped
    // again when the agent goes away.
    let catalog = &h.engine.context().state.catalog;
    let record = catalog
        .derived_configs
        .get("default/helper")?
        .expect("derived config cached");
    assert_eq!(record.model, "gpt-4.1");
    assert_eq!(record.tool_servers, vec!["default/sales-mcp".to_string()]);

    h.store.delete_resource(ResourceKind::Agent, &key("helper"))?;
    h.engine
        .reconcile(ResourceKind::Agent, &key("helper"))
        .await?;
    assert!(catalog.derived_configs.get("default/helper")?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_agent_with_missing_model_config_is_dependency_failure() -> Result<()> {
    let h = common::engine_with(Vec::new());
    h.store.create_resource(common::agent("helper", "ghost"))?;

    let err = h
        .engine
        .reconcile(ResourceKind::Agent, &key("helper"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        tend::error::ReconcileError::MissingDependency { .. }
    ));

    let status = match h
        .store
        .get_resource(ResourceKind::Agent, &key("helper"))?
        .expect("agent present")
    {
        PrimaryResource::Agent { status, .. } => status,
        _ => unreachable!(),
    };
    let accepted = find_condition(&status.conditions, condition_types::ACCEPTED)
        .expect("accepted condition");
    assert_eq!(accepted.reason, "ReconcileFailed");
    Ok(())
}
