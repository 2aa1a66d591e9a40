//! Convergence, write suppression, and garbage collection.

use crate::common::{self, key};
use anyhow::Result;
use tend::manifest::{OwnedManifest, OwnerRef, RegistrationManifest};
use tend::resource::remote::RemoteProtocol;
use tend::store::ResourceStore;
use tend::types::{OwnedKind, ResourceKind};
use std::collections::BTreeMap;

#[tokio::test]
async fn test_repeated_reconcile_issues_no_further_writes() -> Result<()> {
    let h = common::engine_with(Vec::new());
    h.store.put_secret(common::secret("s", "token", "abc"))?;
    h.store.create_resource(common::datasource("a", "s"))?;

    h.engine
        .reconcile(ResourceKind::DataSource, &key("a"))
        .await?;
    let owned_writes = h.store.owned_write_count();
    let status_writes = h.store.status_write_count();
    assert_eq!(status_writes, 1);

    // Nothing changed externally: the second pass must be a pure read.
    h.engine
        .reconcile(ResourceKind::DataSource, &key("a"))
        .await?;
    assert_eq!(h.store.owned_write_count(), owned_writes);
    assert_eq!(h.store.status_write_count(), status_writes);
    Ok(())
}

#[tokio::test]
async fn test_identical_failures_write_status_once() -> Result<()> {
    let h = common::engine_with(Vec::new());
    h.store.create_resource(common::datasource("a", "absent"))?;

    assert!(h
        .engine
        .reconcile(ResourceKind::DataSource, &key("a"))
        .await
        .is_err());
    let status_writes = h.store.status_write_count();

    assert!(h
        .engine
        .reconcile(ResourceKind::DataSource, &key("a"))
        .await
        .is_err());
    assert_eq!(h.store.status_write_count(), status_writes);
    Ok(())
}

#[tokio::test]
async fn test_orphaned_object_is_pruned_exactly() -> Result<()> {
    let h = common::engine_with(Vec::new());
    h.store.put_secret(common::secret("s", "token", "abc"))?;
    let created = h.store.create_resource(common::datasource("a", "s"))?;
    h.engine
        .reconcile(ResourceKind::DataSource, &key("a"))
        .await?;

    // A leftover from an older naming scheme, owned by the same resource.
    let owner = OwnerRef {
        kind: ResourceKind::DataSource,
        key: key("a"),
        uid: created.uid(),
    };
    h.store.create_owned(
        OwnedManifest::Registration(RegistrationManifest {
            name: "a-mcp-v1".into(),
            labels: BTreeMap::new(),
            protocol: RemoteProtocol::StreamableHttp,
            url: "http://a-mcp-v1.default:8080/mcp".into(),
            description: String::new(),
        }),
        owner,
    )?;
    assert_eq!(h.store.list_owned_by(created.uid())?.len(), 4);

    let deletes_before = h.store.owned_delete_count();
    h.engine
        .reconcile(ResourceKind::DataSource, &key("a"))
        .await?;

    // Exactly the orphan disappeared; the managed trio is untouched.
    let remaining = h.store.list_owned_by(created.uid())?;
    assert_eq!(remaining.len(), 3);
    assert!(remaining.iter().all(|obj| obj.name() == "a-mcp"));
    assert_eq!(h.store.owned_delete_count(), deletes_before + 1);
    assert!(h
        .store
        .get_owned(OwnedKind::Registration, &key("a-mcp-v1"))?
        .is_none());
    Ok(())
}
