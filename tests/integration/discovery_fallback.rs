//! Capability discovery and its last-known-good fallback.

use crate::common::{self, key, Discovery};
use anyhow::Result;
use tend::error::ReconcileError;
use tend::resource::condition::{find_condition, is_condition_true, types as condition_types};
use tend::resource::{PrimaryResource, RemoteServerStatus, SecretReference};
use tend::store::ResourceStore;
use tend::types::ResourceKind;

fn remote_status(h: &common::Harness) -> Result<RemoteServerStatus> {
    match h
        .store
        .get_resource(ResourceKind::RemoteServer, &key("tools"))?
        .expect("remote server present")
    {
        PrimaryResource::RemoteServer { status, .. } => Ok(status),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_discovery_replaces_snapshot_whole() -> Result<()> {
    let h = common::engine_with(vec![
        Discovery::Tools(vec![
            ("query_model", "Run a semantic query"),
            ("list_models", "List semantic models"),
        ]),
        Discovery::Tools(vec![("query_model", "Run a semantic query")]),
    ]);
    h.store.create_resource(common::remote_server("tools", Vec::new()))?;

    h.engine
        .reconcile(ResourceKind::RemoteServer, &key("tools"))
        .await?;
    let status = remote_status(&h)?;
    assert!(is_condition_true(&status.conditions, condition_types::CONNECTED));
    assert_eq!(status.discovered_capabilities.len(), 2);
    assert_eq!(status.discovered_capabilities[0].name, "query_model");

    // A shrunken server answer replaces the snapshot, not merges into it.
    h.engine
        .reconcile(ResourceKind::RemoteServer, &key("tools"))
        .await?;
    let status = remote_status(&h)?;
    assert_eq!(status.discovered_capabilities.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_transient_outage_keeps_last_known_good() -> Result<()> {
    let h = common::engine_with(vec![
        Discovery::Tools(vec![("query_model", "Run a semantic query")]),
        Discovery::Unreachable,
    ]);
    h.store.create_resource(common::remote_server("tools", Vec::new()))?;
    h.engine
        .reconcile(ResourceKind::RemoteServer, &key("tools"))
        .await?;

    let err = h
        .engine
        .reconcile(ResourceKind::RemoteServer, &key("tools"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Transport(_)));

    // Stale beats empty: the previously discovered set survives the outage,
    // while connectivity reports the failure.
    let status = remote_status(&h)?;
    assert_eq!(status.discovered_capabilities.len(), 1);
    assert_eq!(status.discovered_capabilities[0].name, "query_model");
    let connected = find_condition(&status.conditions, condition_types::CONNECTED)
        .expect("connected condition");
    assert_eq!(connected.reason, "DiscoveryFailed");
    assert!(!is_condition_true(&status.conditions, condition_types::READY));
    Ok(())
}

#[tokio::test]
async fn test_outage_with_no_history_leaves_status_empty() -> Result<()> {
    let h = common::engine_with(vec![Discovery::Unreachable]);
    h.store.create_resource(common::remote_server("tools", Vec::new()))?;

    let err = h
        .engine
        .reconcile(ResourceKind::RemoteServer, &key("tools"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Transport(_)));
    let status = remote_status(&h)?;
    assert!(status.discovered_capabilities.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_missing_header_secret_is_credential_failure() -> Result<()> {
    let h = common::engine_with(Vec::new());
    h.store.create_resource(common::remote_server(
        "tools",
        vec![tend::resource::HeaderFromSecret {
            header: "Authorization".into(),
            secret_ref: SecretReference {
                name: "bearer".into(),
                key: "token".into(),
            },
        }],
    ))?;

    let err = h
        .engine
        .reconcile(ResourceKind::RemoteServer, &key("tools"))
        .await
        .unwrap_err();
    assert!(err.is_credential());
    let status = remote_status(&h)?;
    let connected = find_condition(&status.conditions, condition_types::CONNECTED)
        .expect("connected condition");
    assert_eq!(connected.reason, "CredentialsError");
    assert!(status.discovered_capabilities.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_deletion_drops_catalog_record() -> Result<()> {
    let h = common::engine_with(vec![Discovery::Tools(vec![(
        "query_model",
        "Run a semantic query",
    )])]);
    h.store.create_resource(common::remote_server("tools", Vec::new()))?;
    h.engine
        .reconcile(ResourceKind::RemoteServer, &key("tools"))
        .await?;

    let catalog = &h.engine.context().state.catalog;
    assert!(catalog.capability_index.get_server("default/tools")?.is_some());
    assert!(catalog
        .capability_index
        .capabilities_for("default/tools")?
        .is_some());

    h.store
        .delete_resource(ResourceKind::RemoteServer, &key("tools"))?;
    h.engine
        .reconcile(ResourceKind::RemoteServer, &key("tools"))
        .await?;
    assert!(catalog.capability_index.get_server("default/tools")?.is_none());
    assert!(catalog
        .capability_index
        .capabilities_for("default/tools")?
        .is_none());
    Ok(())
}
