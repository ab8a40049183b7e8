//! Publish/subscribe channel for layout manager state changes.
//!
//! Listeners are grouped by [`LayoutEventKind`] and called synchronously, in
//! subscription order, from the same call that mutated the manager state. Events are
//! triggers to re-read state from the manager; only `Change` carries a payload.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::storage::Layout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutEventKind {
    Change,
    BusyChanged,
    OnlineChanged,
    ErrorChanged,
}

impl LayoutEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::BusyChanged => "busy-changed",
            Self::OnlineChanged => "online-changed",
            Self::ErrorChanged => "error-changed",
        }
    }
}

#[derive(Debug, Clone)]
pub enum LayoutEvent {
    /// A layout was created, modified or removed. `updated_layout` is the stored
    /// record after the change, or `None` when several layouts changed at once.
    Change { updated_layout: Option<Layout> },
    BusyChanged,
    OnlineChanged,
    ErrorChanged,
}

impl LayoutEvent {
    pub fn kind(&self) -> LayoutEventKind {
        match self {
            Self::Change { .. } => LayoutEventKind::Change,
            Self::BusyChanged => LayoutEventKind::BusyChanged,
            Self::OnlineChanged => LayoutEventKind::OnlineChanged,
            Self::ErrorChanged => LayoutEventKind::ErrorChanged,
        }
    }
}

/// Handle returned by [`LayoutEvents::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

pub type Listener = Arc<dyn Fn(&LayoutEvent) + Send + Sync>;

#[derive(Default)]
pub struct LayoutEvents {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<LayoutEventKind, BTreeMap<ListenerId, Listener>>>,
}

impl LayoutEvents {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<LayoutEventKind, BTreeMap<ListenerId, Listener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<F>(&self, kind: LayoutEventKind, listener: F) -> ListenerId
    where
        F: Fn(&LayoutEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners()
            .entry(kind)
            .or_default()
            .insert(id, Arc::new(listener));
        id
    }

    /// Returns `false` if the listener was not subscribed to `kind`
    pub fn unsubscribe(&self, kind: LayoutEventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let Some(for_kind) = listeners.get_mut(&kind) else {
            return false;
        };
        let removed = for_kind.remove(&id).is_some();
        if for_kind.is_empty() {
            listeners.remove(&kind);
        }
        removed
    }

    pub fn listener_count(&self, kind: LayoutEventKind) -> usize {
        self.listeners().get(&kind).map_or(0, BTreeMap::len)
    }

    /// Call every listener of the event's kind.
    ///
    /// The listener set is snapshotted first, so listeners may subscribe or
    /// unsubscribe while being called.
    pub fn emit(&self, event: &LayoutEvent) {
        let snapshot: Vec<Listener> = match self.listeners().get(&event.kind()) {
            Some(for_kind) => for_kind.values().cloned().collect(),
            None => return,
        };
        log::debug!(
            "Emitting {} to {} listener(s)",
            event.kind().as_str(),
            snapshot.len()
        );
        for listener in snapshot {
            listener(event);
        }
    }
}
