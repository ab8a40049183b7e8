//! Reconciliation between the local layout cache and the remote layout list.
//!
//! A pass lists the remote layouts, pairs them with cached layouts (by external id,
//! falling back to the layout id) and derives one [`SyncOperation`] per record that
//! needs to change:
//!
//! | local status       | remote present               | remote absent                 |
//! |--------------------|------------------------------|-------------------------------|
//! | not cached         | adopt as `tracked`           |                               |
//! | no sync info       | untouched                    | untouched                     |
//! | `new`              | untouched                    | untouched                     |
//! | `tracked`          | refresh baseline when newer  | mark `remotely-deleted`       |
//! | `locally-deleted`  | delete remotely, then purge  | purge                         |
//! | `remotely-deleted` | restore as `tracked`         | purge unless it has edits     |
//!
//! When a baseline is refreshed the remote content wins; unsaved `working` edits are
//! kept as they are and counted as a conflict.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::config::SyncResult;
use super::manager::LayoutError;
use crate::remote::{RemoteLayout, RemoteLayoutStorage};
use crate::storage::{Layout, LayoutSnapshot, LayoutStorage, Namespace, SyncInfo, SyncStatus};

/// A single change decided by a reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOperation {
    /// Cache a remote layout that is not known locally
    AddToCache(RemoteLayout),
    /// Replace the baseline of a tracked layout with a newer remote version
    UpdateBaseline { local: Layout, remote: RemoteLayout },
    /// The remote no longer has this tracked layout
    MarkRemotelyDeleted(Layout),
    /// A remotely-deleted layout is back on the remote
    Restore { local: Layout, remote: RemoteLayout },
    /// Push a local deletion, then drop the cached record
    DeleteRemote { local: Layout, external_id: String },
    /// Drop a cached record whose deletion both sides agree on
    PurgeLocal(Layout),
}

fn is_newer(remote_saved_at: DateTime<Utc>, last_seen: Option<DateTime<Utc>>) -> bool {
    match last_seen {
        Some(last_seen) => remote_saved_at > last_seen,
        None => true,
    }
}

/// Decide what a pass has to do. Pure; performs no I/O.
pub fn compute_sync_operations(local: &[Layout], remote: &[RemoteLayout]) -> Vec<SyncOperation> {
    let by_external_id: HashMap<&str, &RemoteLayout> = remote
        .iter()
        .map(|r| (r.external_id.as_str(), r))
        .collect();
    let by_id: HashMap<_, &RemoteLayout> = remote.iter().map(|r| (r.id, r)).collect();

    let mut paired: HashSet<&str> = HashSet::new();
    let mut operations = Vec::new();

    for layout in local {
        let counterpart = layout
            .external_id
            .as_deref()
            .and_then(|external_id| by_external_id.get(external_id).copied())
            .or_else(|| by_id.get(&layout.id).copied());
        if let Some(remote_layout) = counterpart {
            paired.insert(remote_layout.external_id.as_str());
        }

        let Some(sync_info) = layout.sync_info else {
            // Purely local layout
            continue;
        };

        let operation = match (sync_info.status, counterpart) {
            (SyncStatus::New, _) => None,
            (SyncStatus::Tracked, Some(remote_layout)) => {
                let relinked = layout.external_id.as_deref() != Some(remote_layout.external_id.as_str());
                if relinked || is_newer(remote_layout.saved_at, sync_info.last_remote_saved_at) {
                    Some(SyncOperation::UpdateBaseline {
                        local: layout.clone(),
                        remote: remote_layout.clone(),
                    })
                } else {
                    None
                }
            }
            (SyncStatus::Tracked, None) => Some(SyncOperation::MarkRemotelyDeleted(layout.clone())),
            (SyncStatus::LocallyDeleted, Some(remote_layout)) => Some(SyncOperation::DeleteRemote {
                local: layout.clone(),
                external_id: remote_layout.external_id.clone(),
            }),
            (SyncStatus::LocallyDeleted, None) => Some(SyncOperation::PurgeLocal(layout.clone())),
            (SyncStatus::RemotelyDeleted, Some(remote_layout)) => Some(SyncOperation::Restore {
                local: layout.clone(),
                remote: remote_layout.clone(),
            }),
            (SyncStatus::RemotelyDeleted, None) => {
                if layout.has_unsaved_changes() {
                    None
                } else {
                    Some(SyncOperation::PurgeLocal(layout.clone()))
                }
            }
        };
        operations.extend(operation);
    }

    for remote_layout in remote {
        if !paired.contains(remote_layout.external_id.as_str()) {
            operations.push(SyncOperation::AddToCache(remote_layout.clone()));
        }
    }

    operations
}

/// Local record rebased onto a remote version. Working edits are kept.
fn rebase_on_remote(current: Layout, remote: &RemoteLayout) -> Layout {
    Layout {
        name: remote.name.clone(),
        permission: remote.permission,
        baseline: LayoutSnapshot {
            data: remote.data.clone(),
            saved_at: remote.saved_at,
        },
        sync_info: Some(SyncInfo::tracked(remote.saved_at)),
        external_id: Some(remote.external_id.clone()),
        ..current
    }
}

/// Run one reconciliation pass.
///
/// Cancellation is checked before the remote list call, while it is in flight, and
/// before every operation. Every operation is a complete local write, so stopping
/// between operations leaves the cache consistent.
pub(crate) async fn reconcile(
    local: &dyn LayoutStorage,
    namespace: &Namespace,
    remote: &dyn RemoteLayoutStorage,
    cancel: &CancellationToken,
) -> Result<SyncResult, LayoutError> {
    let mut result = SyncResult::default();

    if cancel.is_cancelled() {
        result.cancelled = true;
        return Ok(result);
    }

    let remote_layouts = tokio::select! {
        _ = cancel.cancelled() => {
            log::info!("Sync: cancelled while listing remote layouts");
            result.cancelled = true;
            return Ok(result);
        }
        listed = remote.get_layouts() => listed?,
    };
    let local_layouts = local.list(namespace).await?;

    let operations = compute_sync_operations(&local_layouts, &remote_layouts);
    log::info!(
        "Sync: {} local, {} remote layouts, {} operation(s)",
        local_layouts.len(),
        remote_layouts.len(),
        operations.len()
    );

    for operation in operations {
        if cancel.is_cancelled() {
            log::info!("Sync: cancelled, stopping before remaining operations");
            result.cancelled = true;
            break;
        }
        apply_operation(local, namespace, remote, operation, &mut result).await?;
    }

    Ok(result)
}

/// Re-read a cached record and check it is still in the state the operation was
/// computed from. Manager operations may have touched it while the remote list was
/// being fetched.
async fn current_record(
    local: &dyn LayoutStorage,
    namespace: &Namespace,
    expected: &Layout,
) -> Result<Option<Layout>, LayoutError> {
    let current = local.get(namespace, expected.id).await?;
    match current {
        Some(current) if current.sync_info == expected.sync_info => Ok(Some(current)),
        _ => {
            log::debug!("Sync: layout {} changed during sync, skipping", expected.id);
            Ok(None)
        }
    }
}

async fn apply_operation(
    local: &dyn LayoutStorage,
    namespace: &Namespace,
    remote: &dyn RemoteLayoutStorage,
    operation: SyncOperation,
    result: &mut SyncResult,
) -> Result<(), LayoutError> {
    match operation {
        SyncOperation::AddToCache(remote_layout) => {
            if local.get(namespace, remote_layout.id).await?.is_some() {
                log::debug!("Sync: layout {} cached during sync, skipping", remote_layout.id);
                return Ok(());
            }
            log::debug!("Sync: caching remote layout {}", remote_layout.id);
            local.put(namespace, Layout::from_remote(remote_layout)).await?;
            result.layouts_added += 1;
        }
        SyncOperation::UpdateBaseline { local: layout, remote: remote_layout } => {
            let Some(current) = current_record(local, namespace, &layout).await? else {
                return Ok(());
            };
            if current.has_unsaved_changes() {
                log::warn!(
                    "Sync: layout {} changed remotely while it has unsaved local changes; \
                     keeping the local changes on top of the new baseline",
                    current.id
                );
                result.conflicts += 1;
            }
            log::debug!("Sync: refreshing baseline of layout {}", current.id);
            local.put(namespace, rebase_on_remote(current, &remote_layout)).await?;
            result.layouts_updated += 1;
        }
        SyncOperation::MarkRemotelyDeleted(layout) => {
            let Some(mut current) = current_record(local, namespace, &layout).await? else {
                return Ok(());
            };
            log::debug!("Sync: layout {} was deleted remotely", current.id);
            current.sync_info = Some(SyncInfo::new(
                SyncStatus::RemotelyDeleted,
                current.sync_info.and_then(|info| info.last_remote_saved_at),
            ));
            local.put(namespace, current).await?;
            result.marked_remotely_deleted += 1;
        }
        SyncOperation::Restore { local: layout, remote: remote_layout } => {
            let Some(current) = current_record(local, namespace, &layout).await? else {
                return Ok(());
            };
            log::debug!("Sync: layout {} reappeared remotely", current.id);
            local.put(namespace, rebase_on_remote(current, &remote_layout)).await?;
            result.layouts_restored += 1;
        }
        SyncOperation::DeleteRemote { local: layout, external_id } => {
            if current_record(local, namespace, &layout).await?.is_none() {
                return Ok(());
            }
            log::debug!("Sync: deleting layout {} remotely ({})", layout.id, external_id);
            if !remote.delete_layout(&external_id).await? {
                log::warn!(
                    "Sync: layout {} was already gone from the remote",
                    layout.id
                );
            }
            local.delete(namespace, layout.id).await?;
            result.remote_deletes += 1;
            result.layouts_purged += 1;
        }
        SyncOperation::PurgeLocal(layout) => {
            if current_record(local, namespace, &layout).await?.is_none() {
                return Ok(());
            }
            log::debug!("Sync: purging layout {}", layout.id);
            local.delete(namespace, layout.id).await?;
            result.layouts_purged += 1;
        }
    }
    Ok(())
}

impl SyncResult {
    /// Whether the pass modified the local cache
    pub fn has_changes(&self) -> bool {
        self.layouts_added
            + self.layouts_updated
            + self.marked_remotely_deleted
            + self.layouts_restored
            + self.layouts_purged
            > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LayoutPermission, MemoryLayoutStorage};
    use crate::sync::testing::FakeRemote;
    use chrono::Duration;
    use serde_json::json;

    fn remote_layout(name: &str) -> RemoteLayout {
        RemoteLayout {
            id: uuid::Uuid::new_v4(),
            external_id: format!("ext-{}", name),
            name: name.to_string(),
            permission: LayoutPermission::OrgWrite,
            data: json!({ "name": name }),
            saved_at: Utc::now(),
        }
    }

    fn with_status(mut layout: Layout, status: SyncStatus) -> Layout {
        let last = layout.sync_info.and_then(|info| info.last_remote_saved_at);
        layout.sync_info = Some(SyncInfo::new(status, last));
        layout
    }

    #[test]
    fn test_remote_only_layouts_are_adopted() {
        let remote = vec![remote_layout("a")];
        let ops = compute_sync_operations(&[], &remote);
        assert_eq!(ops, vec![SyncOperation::AddToCache(remote[0].clone())]);
    }

    #[test]
    fn test_tracked_layout_missing_remotely_is_marked_deleted() {
        let local = Layout::from_remote(remote_layout("a"));
        let ops = compute_sync_operations(&[local.clone()], &[]);
        assert_eq!(ops, vec![SyncOperation::MarkRemotelyDeleted(local)]);
    }

    #[test]
    fn test_new_and_personal_layouts_are_left_alone() {
        let personal = Layout::new("p".to_string(), json!({}), LayoutPermission::CreatorWrite);
        let pending = with_status(personal.clone(), SyncStatus::New);
        let pending = Layout { id: uuid::Uuid::new_v4(), ..pending };

        let ops = compute_sync_operations(&[personal, pending], &[]);
        assert!(ops.is_empty());
    }

    #[test]
    fn test_unchanged_tracked_layout_needs_nothing() {
        let remote = remote_layout("a");
        let local = Layout::from_remote(remote.clone());
        assert!(compute_sync_operations(&[local], &[remote]).is_empty());
    }

    #[test]
    fn test_newer_remote_refreshes_baseline() {
        let remote = remote_layout("a");
        let local = Layout::from_remote(remote.clone());
        let newer = RemoteLayout {
            saved_at: remote.saved_at + Duration::seconds(5),
            ..remote
        };

        let ops = compute_sync_operations(&[local.clone()], &[newer.clone()]);
        assert_eq!(ops, vec![SyncOperation::UpdateBaseline { local, remote: newer }]);
    }

    #[test]
    fn test_pairing_by_id_without_external_id() {
        let remote = remote_layout("a");
        let mut local = Layout::from_remote(remote.clone());
        local.external_id = None;

        let ops = compute_sync_operations(&[local.clone()], &[remote.clone()]);
        // Paired by id, so not adopted twice; relinked to the external id
        assert_eq!(ops, vec![SyncOperation::UpdateBaseline { local, remote }]);
    }

    #[test]
    fn test_stale_external_id_falls_back_to_id() {
        let remote = remote_layout("a");
        let mut local = Layout::from_remote(remote.clone());
        local.external_id = Some("stale-ext".to_string());

        let ops = compute_sync_operations(&[local.clone()], &[remote.clone()]);
        assert_eq!(ops, vec![SyncOperation::UpdateBaseline { local, remote }]);
    }

    #[test]
    fn test_deleted_layouts_transitions() {
        let present = remote_layout("present");
        let locally_deleted = with_status(Layout::from_remote(present.clone()), SyncStatus::LocallyDeleted);
        let gone = with_status(Layout::from_remote(remote_layout("gone")), SyncStatus::LocallyDeleted);
        let remotely_deleted = with_status(Layout::from_remote(remote_layout("rd")), SyncStatus::RemotelyDeleted);
        let mut edited = with_status(Layout::from_remote(remote_layout("edited")), SyncStatus::RemotelyDeleted);
        edited.working = Some(LayoutSnapshot::new(json!({ "edited": true })));

        let ops = compute_sync_operations(
            &[locally_deleted.clone(), gone.clone(), remotely_deleted.clone(), edited],
            &[present.clone()],
        );
        assert_eq!(
            ops,
            vec![
                SyncOperation::DeleteRemote {
                    local: locally_deleted,
                    external_id: present.external_id.clone(),
                },
                SyncOperation::PurgeLocal(gone),
                SyncOperation::PurgeLocal(remotely_deleted),
            ]
        );
    }

    #[test]
    fn test_reappearing_layout_is_restored() {
        let remote = remote_layout("back");
        let local = with_status(Layout::from_remote(remote.clone()), SyncStatus::RemotelyDeleted);
        let ops = compute_sync_operations(&[local.clone()], &[remote.clone()]);
        assert_eq!(ops, vec![SyncOperation::Restore { local, remote }]);
    }

    #[tokio::test]
    async fn test_refresh_keeps_working_changes() {
        let storage = MemoryLayoutStorage::new();
        let namespace = Namespace::Org("team".to_string());
        let remote = FakeRemote::new("team");

        let original = remote_layout("a");
        let mut local = Layout::from_remote(original.clone());
        local.working = Some(LayoutSnapshot::new(json!({ "mine": true })));
        storage.put(&namespace, local.clone()).await.unwrap();

        let newer = RemoteLayout {
            data: json!({ "theirs": true }),
            saved_at: original.saved_at + Duration::seconds(1),
            ..original
        };
        remote.insert(newer.clone());

        let result = reconcile(&storage, &namespace, &remote, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.layouts_updated, 1);
        assert_eq!(result.conflicts, 1);

        let stored = storage.get(&namespace, local.id).await.unwrap().unwrap();
        assert_eq!(stored.baseline.data, json!({ "theirs": true }));
        assert_eq!(stored.working.unwrap().data, json!({ "mine": true }));
        assert_eq!(stored.sync_info, Some(SyncInfo::tracked(newer.saved_at)));
    }

    #[tokio::test]
    async fn test_locally_deleted_layout_is_deleted_remotely_and_purged() {
        let storage = MemoryLayoutStorage::new();
        let namespace = Namespace::Org("team".to_string());
        let remote = FakeRemote::new("team");

        let shared = remote_layout("a");
        remote.insert(shared.clone());
        let local = with_status(Layout::from_remote(shared.clone()), SyncStatus::LocallyDeleted);
        storage.put(&namespace, local.clone()).await.unwrap();

        let result = reconcile(&storage, &namespace, &remote, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.remote_deletes, 1);
        assert_eq!(result.layouts_purged, 1);
        assert!(storage.get(&namespace, local.id).await.unwrap().is_none());
        assert_eq!(remote.delete_calls(), 1);
        assert!(remote.layouts().is_empty());
    }

    #[tokio::test]
    async fn test_relinked_layout_stays_tracked() {
        let storage = MemoryLayoutStorage::new();
        let namespace = Namespace::Org("team".to_string());
        let remote = FakeRemote::new("team");

        let shared = remote_layout("a");
        remote.insert(shared.clone());
        let mut local = Layout::from_remote(shared.clone());
        local.external_id = Some("stale-ext".to_string());
        local.working = Some(LayoutSnapshot::new(json!({ "mine": true })));
        storage.put(&namespace, local.clone()).await.unwrap();

        let result = reconcile(&storage, &namespace, &remote, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.layouts_updated, 1);
        assert_eq!(result.marked_remotely_deleted, 0);
        assert_eq!(result.layouts_added, 0);

        let stored = storage.get(&namespace, local.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), Some(SyncStatus::Tracked));
        assert_eq!(stored.external_id, Some(shared.external_id));
        assert!(stored.working.is_some());
    }

    #[tokio::test]
    async fn test_cancel_between_operations_stops_remote_deletes() {
        let storage = MemoryLayoutStorage::new();
        let namespace = Namespace::Org("team".to_string());
        let remote = FakeRemote::new("team");
        let cancel = CancellationToken::new();
        remote.cancel_on_delete(cancel.clone());

        for name in ["a", "b", "c"] {
            let shared = remote_layout(name);
            remote.insert(shared.clone());
            let local = with_status(Layout::from_remote(shared), SyncStatus::LocallyDeleted);
            storage.put(&namespace, local).await.unwrap();
        }

        let result = reconcile(&storage, &namespace, &remote, &cancel).await.unwrap();
        assert!(result.cancelled);
        assert_eq!(remote.delete_calls(), 1);
        assert_eq!(result.remote_deletes, 1);
        assert_eq!(remote.layouts().len(), 2);

        let remaining = storage.list(&namespace).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining
            .iter()
            .all(|l| l.status() == Some(SyncStatus::LocallyDeleted)));
    }

    #[tokio::test]
    async fn test_cancelled_pass_makes_no_remote_calls() {
        let storage = MemoryLayoutStorage::new();
        let namespace = Namespace::Local;
        let remote = FakeRemote::new("team");
        remote.insert(remote_layout("a"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = reconcile(&storage, &namespace, &remote, &cancel).await.unwrap();

        assert!(result.cancelled);
        assert!(!result.has_changes());
        assert_eq!(remote.list_calls(), 0);
        assert!(storage.list(&namespace).await.unwrap().is_empty());
    }
}
