use serde::{Deserialize, Serialize};

/// When the scheduler triggers a sync
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// User-triggered sync only
    #[default]
    Manual,
    /// Sync at regular intervals
    Periodic,
}

/// Sync scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    #[serde(default)]
    pub mode: SyncMode,
    /// Sync interval in seconds (for periodic mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Remote layouts adopted into the local cache
    pub layouts_added: usize,
    /// Cached layouts whose baseline was refreshed from the remote
    pub layouts_updated: usize,
    /// Cached layouts that disappeared remotely
    pub marked_remotely_deleted: usize,
    /// Remotely-deleted layouts that reappeared on the remote
    pub layouts_restored: usize,
    /// Local deletions pushed to the remote
    pub remote_deletes: usize,
    /// Records removed from the local cache
    pub layouts_purged: usize,
    /// Refreshed layouts that also carried unsaved local edits
    pub conflicts: usize,
    /// The pass stopped early because it was cancelled
    pub cancelled: bool,
    /// Duration of sync in milliseconds
    pub duration_ms: u64,
}
