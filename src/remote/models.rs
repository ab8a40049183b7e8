use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{LayoutData, LayoutId, LayoutPermission};

/// A layout as stored by the remote backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLayout {
    /// Id assigned by the client that created the layout
    pub id: LayoutId,
    /// Id assigned by the remote backend
    pub external_id: String,
    pub name: String,
    pub permission: LayoutPermission,
    pub data: LayoutData,
    pub saved_at: DateTime<Utc>,
}

/// Request to create a layout remotely
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRemoteLayout {
    pub id: LayoutId,
    pub name: String,
    pub permission: LayoutPermission,
    pub data: LayoutData,
    pub saved_at: DateTime<Utc>,
}

/// Request to change a remote layout. `None` fields are left unchanged.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLayoutUpdate {
    pub id: LayoutId,
    #[serde(skip)]
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<LayoutData>,
    pub saved_at: DateTime<Utc>,
}

/// Outcome of a remote update
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteUpdateResult {
    Success(RemoteLayout),
    /// The remote record changed since it was last fetched
    Conflict,
}
