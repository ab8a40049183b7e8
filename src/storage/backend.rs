use async_trait::async_trait;

use super::file_storage::Result;
use super::models::{Layout, LayoutId, Namespace};

/// Durable cache of layouts, partitioned by namespace.
///
/// Lookups of missing records resolve to `None`; errors are reserved for I/O and
/// decoding failures.
#[async_trait]
pub trait LayoutStorage: Send + Sync {
    async fn list(&self, namespace: &Namespace) -> Result<Vec<Layout>>;

    async fn get(&self, namespace: &Namespace, id: LayoutId) -> Result<Option<Layout>>;

    /// Insert or replace a layout, returning the stored record
    async fn put(&self, namespace: &Namespace, layout: Layout) -> Result<Layout>;

    /// Remove a layout. Deleting a missing record is not an error.
    async fn delete(&self, namespace: &Namespace, id: LayoutId) -> Result<()>;

    /// Move every layout from one namespace into another.
    /// Records already present in the target namespace are kept as they are; a source
    /// record that differs from its target stays behind in the source namespace.
    async fn import_layouts(&self, from: &Namespace, to: &Namespace) -> Result<usize>;

    /// Move layouts saved before namespaces existed into `namespace`, with the same
    /// clash handling as [`LayoutStorage::import_layouts`]
    async fn migrate_unnamespaced_layouts(&self, namespace: &Namespace) -> Result<usize>;
}
