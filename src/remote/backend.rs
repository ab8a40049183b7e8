use async_trait::async_trait;

use super::client::RemoteError;
use super::models::{NewRemoteLayout, RemoteLayout, RemoteLayoutUpdate, RemoteUpdateResult};
use crate::storage::LayoutId;

/// Canonical store for shared layouts
#[async_trait]
pub trait RemoteLayoutStorage: Send + Sync {
    /// Workspace whose layouts this store serves
    fn workspace(&self) -> &str;

    async fn get_layouts(&self) -> Result<Vec<RemoteLayout>, RemoteError>;

    /// Fetch one layout by its client-assigned id, `None` if the remote has no such layout
    async fn get_layout(&self, id: LayoutId) -> Result<Option<RemoteLayout>, RemoteError>;

    async fn save_new_layout(&self, layout: NewRemoteLayout) -> Result<RemoteLayout, RemoteError>;

    async fn update_layout(
        &self,
        update: RemoteLayoutUpdate,
    ) -> Result<RemoteUpdateResult, RemoteError>;

    /// Returns `false` if the remote had no layout with this id
    async fn delete_layout(&self, external_id: &str) -> Result<bool, RemoteError>;
}
