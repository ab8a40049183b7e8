//! In-memory remote store with call counters and failure switches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::remote::{
    NewRemoteLayout, RemoteError, RemoteLayout, RemoteLayoutStorage, RemoteLayoutUpdate,
    RemoteUpdateResult,
};
use crate::storage::{LayoutId, LayoutPermission};

#[derive(Default)]
pub(crate) struct FakeRemote {
    workspace: String,
    layouts: Mutex<HashMap<String, RemoteLayout>>,
    list_gate: Mutex<Option<Arc<Semaphore>>>,
    list_failure: Mutex<Option<String>>,
    conflict_next: AtomicBool,
    delete_cancels: Mutex<Option<CancellationToken>>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    save_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn new(workspace: &str) -> Self {
        Self {
            workspace: workspace.to_string(),
            ..Default::default()
        }
    }

    /// A layout that is not stored yet
    pub fn sample(&self, name: &str) -> RemoteLayout {
        let id = Uuid::new_v4();
        RemoteLayout {
            id,
            external_id: format!("ext-{}", id),
            name: name.to_string(),
            permission: LayoutPermission::OrgWrite,
            data: json!({ "panels": [name] }),
            saved_at: Utc::now(),
        }
    }

    pub fn insert(&self, layout: RemoteLayout) {
        self.layouts
            .lock()
            .unwrap()
            .insert(layout.external_id.clone(), layout);
    }

    pub fn layouts(&self) -> Vec<RemoteLayout> {
        let mut layouts: Vec<_> = self.layouts.lock().unwrap().values().cloned().collect();
        layouts.sort_by(|a, b| a.name.cmp(&b.name));
        layouts
    }

    /// Make `get_layouts` wait for a permit on the returned semaphore
    pub fn hold_list(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.list_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn release_list(&self) {
        if let Some(gate) = self.list_gate.lock().unwrap().take() {
            gate.close();
        }
    }

    pub fn fail_list(&self, message: &str) {
        *self.list_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn clear_failure(&self) {
        *self.list_failure.lock().unwrap() = None;
    }

    /// Cancel `token` when `delete_layout` is called
    pub fn cancel_on_delete(&self, token: CancellationToken) {
        *self.delete_cancels.lock().unwrap() = Some(token);
    }

    pub fn conflict_next_update(&self) {
        self.conflict_next.store(true, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteLayoutStorage for FakeRemote {
    fn workspace(&self) -> &str {
        &self.workspace
    }

    async fn get_layouts(&self) -> Result<Vec<RemoteLayout>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.list_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            // A closed gate lets every caller through
            let _ = gate.acquire().await;
        }
        if let Some(message) = self.list_failure.lock().unwrap().clone() {
            return Err(RemoteError::Unavailable(message));
        }
        Ok(self.layouts())
    }

    async fn get_layout(&self, id: LayoutId) -> Result<Option<RemoteLayout>, RemoteError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .layouts
            .lock()
            .unwrap()
            .values()
            .find(|l| l.id == id)
            .cloned())
    }

    async fn save_new_layout(&self, layout: NewRemoteLayout) -> Result<RemoteLayout, RemoteError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let created = RemoteLayout {
            id: layout.id,
            external_id: format!("ext-{}", layout.id),
            name: layout.name,
            permission: layout.permission,
            data: layout.data,
            saved_at: layout.saved_at,
        };
        self.insert(created.clone());
        Ok(created)
    }

    async fn update_layout(
        &self,
        update: RemoteLayoutUpdate,
    ) -> Result<RemoteUpdateResult, RemoteError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.conflict_next.swap(false, Ordering::SeqCst) {
            return Ok(RemoteUpdateResult::Conflict);
        }

        let mut layouts = self.layouts.lock().unwrap();
        let Some(existing) = layouts.get_mut(&update.external_id) else {
            return Err(RemoteError::NotFound(update.external_id));
        };
        if let Some(name) = update.name {
            existing.name = name;
        }
        if let Some(data) = update.data {
            existing.data = data;
        }
        // The server stamps its own save time
        existing.saved_at = update.saved_at.max(existing.saved_at) + Duration::milliseconds(1);
        Ok(RemoteUpdateResult::Success(existing.clone()))
    }

    async fn delete_layout(&self, external_id: &str) -> Result<bool, RemoteError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = self.delete_cancels.lock().unwrap().as_ref() {
            token.cancel();
        }
        Ok(self.layouts.lock().unwrap().remove(external_id).is_some())
    }
}
