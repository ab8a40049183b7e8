use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;

use super::backend::LayoutStorage;
use super::models::{Layout, LayoutId, Namespace};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Data directory not found")]
    DataDirNotFound,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Layout cache on disk.
///
/// Each layout is a JSON file at `<base>/layouts/<namespace>/<id>.json`. JSON files
/// directly under `<base>/layouts/` were written before namespaces existed and are
/// picked up by [`LayoutStorage::migrate_unnamespaced_layouts`].
pub struct FileLayoutStorage {
    base_path: PathBuf,
}

impl FileLayoutStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|p| p.join("layouts"))
            .ok_or(StorageError::DataDirNotFound)
    }

    /// Initialize storage directories
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(self.layouts_dir()).await?;
        Ok(())
    }

    fn layouts_dir(&self) -> PathBuf {
        self.base_path.join("layouts")
    }

    fn namespace_dir(&self, namespace: &Namespace) -> PathBuf {
        self.layouts_dir().join(namespace.key())
    }

    fn layout_path(&self, namespace: &Namespace, id: LayoutId) -> PathBuf {
        self.namespace_dir(namespace).join(format!("{}.json", id))
    }

    async fn write_layout(path: &Path, layout: &Layout) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(layout)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, path).await?;
        Ok(())
    }

    async fn read_layout(path: &Path) -> Result<Layout> {
        let content = fs::read_to_string(path).await?;
        let layout: Layout = serde_json::from_str(&content)?;
        Ok(layout)
    }

    /// Load every layout file in a directory (non-recursive), skipping unreadable files
    async fn read_dir_layouts(dir: &Path) -> Result<Vec<(PathBuf, Layout)>> {
        let mut layouts = Vec::new();

        if !fs::try_exists(dir).await? {
            return Ok(layouts);
        }

        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if path.extension().map_or(false, |ext| ext == "json") {
                match Self::read_layout(&path).await {
                    Ok(layout) => layouts.push((path, layout)),
                    Err(e) => {
                        log::warn!("Failed to load layout from {:?}: {}", path, e);
                    }
                }
            }
        }

        Ok(layouts)
    }

    /// Move layout files from `source_dir` into `namespace`, keeping existing targets.
    /// A source file that differs from its target is left where it is.
    async fn move_layouts(&self, source_dir: &Path, namespace: &Namespace) -> Result<usize> {
        let mut moved = 0;
        for (path, layout) in Self::read_dir_layouts(source_dir).await? {
            let target = self.layout_path(namespace, layout.id);
            if fs::try_exists(&target).await? {
                let existing = Self::read_layout(&target).await.ok();
                if existing.as_ref() != Some(&layout) {
                    log::warn!(
                        "Layout {} already present in namespace {} with different contents, \
                         leaving {:?} in place",
                        layout.id,
                        namespace,
                        path
                    );
                    continue;
                }
                log::debug!(
                    "Layout {} already present in namespace {}, dropping duplicate",
                    layout.id,
                    namespace
                );
            } else {
                Self::write_layout(&target, &layout).await?;
                moved += 1;
            }
            fs::remove_file(&path).await?;
        }
        Ok(moved)
    }
}

#[async_trait]
impl LayoutStorage for FileLayoutStorage {
    async fn list(&self, namespace: &Namespace) -> Result<Vec<Layout>> {
        let mut layouts: Vec<Layout> = Self::read_dir_layouts(&self.namespace_dir(namespace))
            .await?
            .into_iter()
            .map(|(_, layout)| layout)
            .collect();

        // Sort by name
        layouts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(layouts)
    }

    async fn get(&self, namespace: &Namespace, id: LayoutId) -> Result<Option<Layout>> {
        let path = self.layout_path(namespace, id);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        Ok(Some(Self::read_layout(&path).await?))
    }

    async fn put(&self, namespace: &Namespace, layout: Layout) -> Result<Layout> {
        let path = self.layout_path(namespace, layout.id);
        Self::write_layout(&path, &layout).await?;
        Ok(layout)
    }

    async fn delete(&self, namespace: &Namespace, id: LayoutId) -> Result<()> {
        let path = self.layout_path(namespace, id);
        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn import_layouts(&self, from: &Namespace, to: &Namespace) -> Result<usize> {
        if from == to {
            return Err(StorageError::InvalidOperation(format!(
                "Cannot import layouts from namespace {} into itself",
                from
            )));
        }
        let moved = self.move_layouts(&self.namespace_dir(from), to).await?;
        if moved > 0 {
            log::info!("Imported {} layouts from {} into {}", moved, from, to);
        }
        Ok(moved)
    }

    async fn migrate_unnamespaced_layouts(&self, namespace: &Namespace) -> Result<usize> {
        let moved = self.move_layouts(&self.layouts_dir(), namespace).await?;
        if moved > 0 {
            log::info!("Migrated {} legacy layouts into {}", moved, namespace);
        }
        Ok(moved)
    }
}
