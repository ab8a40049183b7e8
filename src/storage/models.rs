use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::remote::RemoteLayout;

/// Identifier assigned to a layout when it is first created
pub type LayoutId = Uuid;

/// Opaque layout content (panel configuration, global variables, ...)
pub type LayoutData = serde_json::Value;

/// Who may edit a layout
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayoutPermission {
    /// Personal layout, owned by the current user
    CreatorWrite,
    /// Shared layout, editable by the team
    OrgWrite,
    /// Shared layout, read-only for the current user
    OrgRead,
}

impl LayoutPermission {
    /// Shared layouts are backed by the remote store
    pub fn is_shared(self) -> bool {
        match self {
            Self::CreatorWrite => false,
            Self::OrgWrite | Self::OrgRead => true,
        }
    }

    pub fn is_read_only(self) -> bool {
        match self {
            Self::OrgRead => true,
            Self::CreatorWrite | Self::OrgWrite => false,
        }
    }
}

impl Default for LayoutPermission {
    fn default() -> Self {
        Self::CreatorWrite
    }
}

/// A saved copy of layout content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSnapshot {
    pub data: LayoutData,
    pub saved_at: DateTime<Utc>,
}

impl LayoutSnapshot {
    pub fn new(data: LayoutData) -> Self {
        Self {
            data,
            saved_at: Utc::now(),
        }
    }
}

/// Relationship of a cached layout to its remote record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// Created locally, no remote record yet
    New,
    /// Mirrors a remote record
    Tracked,
    /// Deleted here, remote deletion pending
    LocallyDeleted,
    /// Gone from the remote, local purge pending
    RemotelyDeleted,
}

impl SyncStatus {
    pub fn is_deleted(self) -> bool {
        match self {
            Self::New | Self::Tracked => false,
            Self::LocallyDeleted | Self::RemotelyDeleted => true,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::New => "new",
            Self::Tracked => "tracked",
            Self::LocallyDeleted => "locally-deleted",
            Self::RemotelyDeleted => "remotely-deleted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_remote_saved_at: Option<DateTime<Utc>>,
}

impl SyncInfo {
    pub fn new(status: SyncStatus, last_remote_saved_at: Option<DateTime<Utc>>) -> Self {
        Self {
            status,
            last_remote_saved_at,
        }
    }

    pub fn tracked(last_remote_saved_at: DateTime<Utc>) -> Self {
        Self::new(SyncStatus::Tracked, Some(last_remote_saved_at))
    }
}

/// A saved workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub id: LayoutId,
    pub name: String,
    pub permission: LayoutPermission,
    /// Last confirmed content
    pub baseline: LayoutSnapshot,
    /// Uncommitted local edits on top of `baseline`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working: Option<LayoutSnapshot>,
    /// `None` for layouts that have never been related to a remote record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_info: Option<SyncInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl Layout {
    /// Create a purely local layout
    pub fn new(name: String, data: LayoutData, permission: LayoutPermission) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            permission,
            baseline: LayoutSnapshot::new(data),
            working: None,
            sync_info: None,
            external_id: None,
        }
    }

    /// Build a tracked cache entry from a remote record
    pub fn from_remote(remote: RemoteLayout) -> Self {
        Self {
            id: remote.id,
            name: remote.name,
            permission: remote.permission,
            baseline: LayoutSnapshot {
                data: remote.data,
                saved_at: remote.saved_at,
            },
            working: None,
            sync_info: Some(SyncInfo::tracked(remote.saved_at)),
            external_id: Some(remote.external_id),
        }
    }

    pub fn is_shared(&self) -> bool {
        self.permission.is_shared()
    }

    pub fn status(&self) -> Option<SyncStatus> {
        self.sync_info.map(|info| info.status)
    }

    /// Whether the layout should be offered to the user
    pub fn is_active(&self) -> bool {
        match self.status() {
            Some(status) => !status.is_deleted(),
            None => true,
        }
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.working.is_some()
    }

    /// Content the user currently sees: working edits if present, otherwise the baseline
    pub fn current_data(&self) -> &LayoutData {
        self.working
            .as_ref()
            .map_or(&self.baseline.data, |working| &working.data)
    }
}

/// Storage partition for cached layouts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Layouts kept on this device only
    Local,
    /// Cache of a remote workspace
    Org(String),
}

impl Namespace {
    /// Directory or key prefix used for this namespace
    pub fn key(&self) -> String {
        match self {
            Self::Local => "local".to_string(),
            Self::Org(workspace) => format!("org-{}", workspace),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Input for creating a layout
#[derive(Debug, Clone)]
pub struct NewLayout {
    pub name: String,
    pub data: LayoutData,
    pub permission: LayoutPermission,
}

/// Input for editing a layout. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct LayoutUpdate {
    pub id: LayoutId,
    pub name: Option<String>,
    pub data: Option<LayoutData>,
}
