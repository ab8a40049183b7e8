use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::config::SyncResult;
use super::events::{LayoutEvent, LayoutEventKind, LayoutEvents, ListenerId};
use super::reconcile;
use crate::remote::{
    NewRemoteLayout, RemoteError, RemoteLayoutStorage, RemoteLayoutUpdate, RemoteUpdateResult,
};
use crate::storage::{
    Layout, LayoutId, LayoutPermission, LayoutSnapshot, LayoutStorage, LayoutUpdate, Namespace,
    NewLayout, StorageError, SyncInfo, SyncStatus,
};

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Cannot {action} layout {id} because it does not exist")]
    NotFound { action: &'static str, id: LayoutId },
    #[error("Shared layouts are not supported without remote layout storage")]
    SharingUnsupported,
    #[error("Cannot {0} while offline")]
    Offline(&'static str),
    #[error("Local layout does not have externalId")]
    MissingExternalId,
    #[error("Layout {0} is read-only")]
    ReadOnly(LayoutId),
    #[error("Layout {0} was modified remotely")]
    Conflict(LayoutId),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Sync task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// Failure of a sync pass, shared by every caller that awaited it
    #[error(transparent)]
    Sync(Arc<LayoutError>),
}

type SyncHandle = Shared<BoxFuture<'static, Result<SyncResult, Arc<LayoutError>>>>;

#[derive(Default)]
struct ManagerState {
    online: bool,
    error: Option<Arc<LayoutError>>,
    /// Number of outstanding asynchronous operations
    busy: usize,
    /// The sync pass currently running, if any
    sync_in_flight: Option<SyncHandle>,
}

struct ManagerInner {
    local: Arc<dyn LayoutStorage>,
    remote: Option<Arc<dyn RemoteLayoutStorage>>,
    namespace: Namespace,
    /// Set once legacy and local-only layouts have been moved into `namespace`
    prepared: OnceCell<()>,
    state: Mutex<ManagerState>,
    events: LayoutEvents,
}

/// Marks the manager busy for as long as it is alive
struct BusyGuard {
    inner: Arc<ManagerInner>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let became_idle = {
            let mut state = self.inner.state();
            state.busy = state.busy.saturating_sub(1);
            state.busy == 0
        };
        if became_idle {
            self.inner.events.emit(&LayoutEvent::BusyChanged);
        }
    }
}

impl ManagerInner {
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_busy(self: &Arc<Self>) -> BusyGuard {
        let became_busy = {
            let mut state = self.state();
            state.busy += 1;
            state.busy == 1
        };
        if became_busy {
            self.events.emit(&LayoutEvent::BusyChanged);
        }
        BusyGuard {
            inner: Arc::clone(self),
        }
    }

    fn is_online(&self) -> bool {
        self.state().online
    }

    fn set_error(&self, error: Option<Arc<LayoutError>>) {
        self.state().error = error;
        self.events.emit(&LayoutEvent::ErrorChanged);
    }

    fn notify_change(&self, updated_layout: Option<Layout>) {
        self.events.emit(&LayoutEvent::Change { updated_layout });
    }

    /// Local storage, after one-time preparation of the namespace
    async fn storage(&self) -> Result<&dyn LayoutStorage, LayoutError> {
        self.prepared
            .get_or_try_init(|| self.prepare_storage())
            .await?;
        Ok(&*self.local)
    }

    async fn prepare_storage(&self) -> Result<(), LayoutError> {
        let migrated = self
            .local
            .migrate_unnamespaced_layouts(&self.namespace)
            .await?;
        let imported = if self.namespace != Namespace::Local {
            self.local
                .import_layouts(&Namespace::Local, &self.namespace)
                .await?
        } else {
            0
        };
        log::debug!(
            "Prepared layout namespace {} (migrated={}, imported={})",
            self.namespace,
            migrated,
            imported
        );
        Ok(())
    }

    fn require_remote(&self) -> Result<&Arc<dyn RemoteLayoutStorage>, LayoutError> {
        self.remote.as_ref().ok_or(LayoutError::SharingUnsupported)
    }

    /// Remote handle and external id for a mutation of a shared layout
    fn shared_mutation(
        &self,
        layout: &Layout,
        action: &'static str,
    ) -> Result<(Arc<dyn RemoteLayoutStorage>, String), LayoutError> {
        let remote = self.require_remote()?;
        if !self.is_online() {
            return Err(LayoutError::Offline(action));
        }
        let external_id = layout
            .external_id
            .clone()
            .ok_or(LayoutError::MissingExternalId)?;
        Ok((Arc::clone(remote), external_id))
    }

    async fn active_layout(&self, id: LayoutId, action: &'static str) -> Result<Layout, LayoutError> {
        self.storage()
            .await?
            .get(&self.namespace, id)
            .await?
            .filter(Layout::is_active)
            .ok_or(LayoutError::NotFound { action, id })
    }

    async fn save(&self, layout: Layout) -> Result<Layout, LayoutError> {
        let saved = self.storage().await?.put(&self.namespace, layout).await?;
        self.notify_change(Some(saved.clone()));
        Ok(saved)
    }

    async fn run_sync(
        self: Arc<Self>,
        remote: Arc<dyn RemoteLayoutStorage>,
        cancel: CancellationToken,
    ) -> Result<SyncResult, Arc<LayoutError>> {
        let _busy = self.begin_busy();
        let start = Instant::now();
        log::info!("Sync: starting for namespace {}", self.namespace);

        let outcome = match self.storage().await {
            Ok(storage) => {
                reconcile::reconcile(storage, &self.namespace, &*remote, &cancel).await
            }
            Err(e) => Err(e),
        };
        self.state().sync_in_flight = None;

        match outcome {
            Ok(mut result) => {
                result.duration_ms = start.elapsed().as_millis() as u64;
                log::info!(
                    "Sync: finished in {}ms (added={}, updated={}, remotely_deleted={}, restored={}, purged={}, conflicts={}, cancelled={})",
                    result.duration_ms,
                    result.layouts_added,
                    result.layouts_updated,
                    result.marked_remotely_deleted,
                    result.layouts_restored,
                    result.layouts_purged,
                    result.conflicts,
                    result.cancelled,
                );
                if result.has_changes() {
                    self.notify_change(None);
                }
                let had_error = self.state().error.is_some();
                if had_error && !result.cancelled {
                    self.set_error(None);
                }
                Ok(result)
            }
            Err(e) => {
                log::error!("Sync: failed for namespace {}: {}", self.namespace, e);
                let e = Arc::new(e);
                self.set_error(Some(Arc::clone(&e)));
                Err(e)
            }
        }
    }
}

/// Entry point for reading and editing layouts.
///
/// Personal layouts live in the local store only. Shared layouts are created,
/// changed and deleted through the remote store first and cached locally. The
/// handle is cheap to clone; clones share state.
#[derive(Clone)]
pub struct LayoutManager {
    inner: Arc<ManagerInner>,
}

impl LayoutManager {
    /// Create a manager. It starts offline; call [`LayoutManager::set_online`] once
    /// connectivity is known.
    pub fn new(
        local: Arc<dyn LayoutStorage>,
        remote: Option<Arc<dyn RemoteLayoutStorage>>,
    ) -> Self {
        let namespace = match &remote {
            Some(remote) => Namespace::Org(remote.workspace().to_string()),
            None => Namespace::Local,
        };
        Self {
            inner: Arc::new(ManagerInner {
                local,
                remote,
                namespace,
                prepared: OnceCell::new(),
                state: Mutex::new(ManagerState::default()),
                events: LayoutEvents::new(),
            }),
        }
    }

    pub fn supports_sharing(&self) -> bool {
        self.inner.remote.is_some()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    pub fn is_online(&self) -> bool {
        self.inner.is_online()
    }

    /// Last sync failure, or an error set by the caller
    pub fn error(&self) -> Option<Arc<LayoutError>> {
        self.inner.state().error.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.state().busy > 0
    }

    pub fn events(&self) -> &LayoutEvents {
        &self.inner.events
    }

    pub fn subscribe<F>(&self, kind: LayoutEventKind, listener: F) -> ListenerId
    where
        F: Fn(&LayoutEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(kind, listener)
    }

    pub fn unsubscribe(&self, kind: LayoutEventKind, id: ListenerId) -> bool {
        self.inner.events.unsubscribe(kind, id)
    }

    pub fn set_online(&self, online: bool) {
        self.inner.state().online = online;
        self.inner.events.emit(&LayoutEvent::OnlineChanged);
    }

    pub fn set_error(&self, error: Option<Arc<LayoutError>>) {
        self.inner.set_error(error);
    }

    /// All cached layouts except deleted ones
    pub async fn get_layouts(&self) -> Result<Vec<Layout>, LayoutError> {
        let storage = self.inner.storage().await?;
        let layouts = storage.list(&self.inner.namespace).await?;
        Ok(layouts.into_iter().filter(Layout::is_active).collect())
    }

    /// Look up a layout in the cache, falling back to the remote store when online.
    /// A layout fetched from the remote is cached before it is returned.
    pub async fn get_layout(&self, id: LayoutId) -> Result<Option<Layout>, LayoutError> {
        let storage = self.inner.storage().await?;
        if let Some(layout) = storage.get(&self.inner.namespace, id).await? {
            return Ok(layout.is_active().then_some(layout));
        }

        let Some(remote) = &self.inner.remote else {
            return Ok(None);
        };
        if !self.is_online() {
            return Ok(None);
        }

        match remote.get_layout(id).await? {
            Some(remote_layout) => {
                log::debug!("Caching layout {} fetched from remote", id);
                let cached = self.inner.save(Layout::from_remote(remote_layout)).await?;
                Ok(Some(cached))
            }
            None => Ok(None),
        }
    }

    pub async fn save_new_layout(&self, new_layout: NewLayout) -> Result<Layout, LayoutError> {
        let _busy = self.inner.begin_busy();
        let NewLayout {
            name,
            data,
            permission,
        } = new_layout;

        if !permission.is_shared() {
            return self.inner.save(Layout::new(name, data, permission)).await;
        }

        let remote = self.inner.require_remote()?;
        if !self.is_online() {
            return Err(LayoutError::Offline("share a layout"));
        }
        self.inner.storage().await?;

        let created = remote
            .save_new_layout(NewRemoteLayout {
                id: Uuid::new_v4(),
                name,
                permission,
                data,
                saved_at: Utc::now(),
            })
            .await?;
        log::info!("Created shared layout {} ({})", created.id, created.external_id);
        self.inner.save(Layout::from_remote(created)).await
    }

    /// Rename a layout and/or edit its content.
    ///
    /// Content edits go to the `working` buffer and are committed with
    /// [`LayoutManager::overwrite_layout`]. Renaming a shared layout is applied
    /// remotely right away.
    pub async fn update_layout(&self, update: LayoutUpdate) -> Result<Layout, LayoutError> {
        let _busy = self.inner.begin_busy();
        let LayoutUpdate { id, name, data } = update;
        let local = self.inner.active_layout(id, "update").await?;
        let now = Utc::now();

        let mut updated = if local.is_shared() {
            let (remote, external_id) = self
                .inner
                .shared_mutation(&local, "update a shared layout")?;
            match name {
                Some(name) => {
                    if local.permission.is_read_only() {
                        return Err(LayoutError::ReadOnly(id));
                    }
                    let result = remote
                        .update_layout(RemoteLayoutUpdate {
                            id,
                            external_id,
                            name: Some(name),
                            data: None,
                            saved_at: now,
                        })
                        .await?;
                    let RemoteUpdateResult::Success(remote_layout) = result else {
                        return Err(LayoutError::Conflict(id));
                    };
                    Layout {
                        name: remote_layout.name,
                        baseline: LayoutSnapshot {
                            data: remote_layout.data,
                            saved_at: remote_layout.saved_at,
                        },
                        sync_info: Some(SyncInfo::tracked(remote_layout.saved_at)),
                        external_id: Some(remote_layout.external_id),
                        ..local
                    }
                }
                None => local,
            }
        } else {
            let is_rename = name.is_some() && data.is_none() && local.working.is_none();
            let mut renamed = local;
            if let Some(name) = name {
                renamed.name = name;
            }
            if is_rename {
                renamed.baseline.saved_at = now;
            }
            renamed
        };

        if let Some(data) = data {
            updated.working = if data == updated.baseline.data {
                None
            } else {
                Some(LayoutSnapshot { data, saved_at: now })
            };
        }

        self.inner.save(updated).await
    }

    /// Delete a layout. Shared layouts are only marked `locally-deleted` here; the
    /// remote record and the cached copy are removed by the next sync.
    pub async fn delete_layout(&self, id: LayoutId) -> Result<(), LayoutError> {
        let _busy = self.inner.begin_busy();
        let local = self.inner.active_layout(id, "delete").await?;

        if local.is_shared() {
            self.inner
                .shared_mutation(&local, "delete a shared layout")?;
            let last_remote_saved_at = local.sync_info.and_then(|info| info.last_remote_saved_at);
            let deleted = Layout {
                sync_info: Some(SyncInfo::new(SyncStatus::LocallyDeleted, last_remote_saved_at)),
                ..local
            };
            self.inner.save(deleted).await?;
        } else {
            let storage = self.inner.storage().await?;
            storage.delete(&self.inner.namespace, id).await?;
            self.inner.notify_change(None);
        }
        Ok(())
    }

    /// Commit the working buffer as the new baseline
    pub async fn overwrite_layout(&self, id: LayoutId) -> Result<Layout, LayoutError> {
        let _busy = self.inner.begin_busy();
        let local = self.inner.active_layout(id, "overwrite").await?;
        let now = Utc::now();

        let updated = if local.is_shared() {
            let (remote, external_id) = self
                .inner
                .shared_mutation(&local, "overwrite a shared layout")?;
            if local.permission.is_read_only() {
                return Err(LayoutError::ReadOnly(id));
            }
            let result = remote
                .update_layout(RemoteLayoutUpdate {
                    id,
                    external_id,
                    name: None,
                    data: Some(local.current_data().clone()),
                    saved_at: now,
                })
                .await?;
            let RemoteUpdateResult::Success(remote_layout) = result else {
                return Err(LayoutError::Conflict(id));
            };
            Layout {
                name: remote_layout.name,
                baseline: LayoutSnapshot {
                    data: remote_layout.data,
                    saved_at: remote_layout.saved_at,
                },
                working: None,
                sync_info: Some(SyncInfo::tracked(remote_layout.saved_at)),
                external_id: Some(remote_layout.external_id),
                ..local
            }
        } else {
            Layout {
                baseline: LayoutSnapshot {
                    data: local.current_data().clone(),
                    saved_at: now,
                },
                working: None,
                ..local
            }
        };

        self.inner.save(updated).await
    }

    /// Discard the working buffer
    pub async fn revert_layout(&self, id: LayoutId) -> Result<Layout, LayoutError> {
        let _busy = self.inner.begin_busy();
        let local = self.inner.active_layout(id, "revert").await?;
        self.inner.save(Layout { working: None, ..local }).await
    }

    /// Copy a layout's baseline into a new personal layout.
    ///
    /// Deleted layouts can be copied too, so content of a layout that vanished from
    /// the remote can still be kept.
    pub async fn make_personal_copy(&self, id: LayoutId, name: String) -> Result<Layout, LayoutError> {
        let _busy = self.inner.begin_busy();
        let source = self
            .inner
            .storage()
            .await?
            .get(&self.inner.namespace, id)
            .await?
            .ok_or(LayoutError::NotFound {
                action: "copy",
                id,
            })?;

        let now = Utc::now();
        let copy = Layout {
            id: Uuid::new_v4(),
            name,
            permission: LayoutPermission::CreatorWrite,
            baseline: LayoutSnapshot {
                data: source.baseline.data,
                saved_at: now,
            },
            working: None,
            sync_info: Some(SyncInfo::new(SyncStatus::New, Some(now))),
            external_id: None,
        };
        self.inner.save(copy).await
    }

    /// Reconcile the local cache with the remote store.
    ///
    /// Does nothing without a remote store. If a pass is already running, the caller
    /// waits for that pass and gets its outcome; `cancel` then has no effect. The pass
    /// runs in a spawned task, so dropping the returned future does not stop it; only
    /// the first caller's `cancel` does. A failure is also kept in
    /// [`LayoutManager::error`] until the next successful pass.
    pub async fn sync_with_remote(&self, cancel: CancellationToken) -> Result<SyncResult, LayoutError> {
        let Some(remote) = self.inner.remote.clone() else {
            log::debug!("Sync: no remote layout storage configured");
            return Ok(SyncResult::default());
        };

        let handle = {
            let mut state = self.inner.state();
            match &state.sync_in_flight {
                Some(handle) => {
                    log::debug!("Sync: already in progress, joining it");
                    handle.clone()
                }
                None => {
                    // The pass runs on its own task so it completes even if every caller goes away
                    let task = tokio::spawn(Arc::clone(&self.inner).run_sync(remote, cancel));
                    let inner = Arc::clone(&self.inner);
                    let handle = async move {
                        match task.await {
                            Ok(outcome) => outcome,
                            Err(e) => {
                                log::error!("Sync: task failed: {}", e);
                                inner.state().sync_in_flight = None;
                                Err(Arc::new(LayoutError::Task(e)))
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    state.sync_in_flight = Some(handle.clone());
                    handle
                }
            }
        };

        handle.await.map_err(LayoutError::Sync)
    }
}
