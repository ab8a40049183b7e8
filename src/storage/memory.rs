use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::backend::LayoutStorage;
use super::file_storage::{Result, StorageError};
use super::models::{Layout, LayoutId, Namespace};

/// Non-persistent layout cache, for ephemeral sessions and tests
#[derive(Default)]
pub struct MemoryLayoutStorage {
    namespaces: Mutex<HashMap<Namespace, HashMap<LayoutId, Layout>>>,
    /// Layouts written before namespaces existed
    unnamespaced: Mutex<HashMap<LayoutId, Layout>>,
}

impl MemoryLayoutStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a layout in the legacy, un-namespaced area
    pub fn insert_unnamespaced(&self, layout: Layout) {
        lock(&self.unnamespaced).insert(layout.id, layout);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl LayoutStorage for MemoryLayoutStorage {
    async fn list(&self, namespace: &Namespace) -> Result<Vec<Layout>> {
        let namespaces = lock(&self.namespaces);
        let mut layouts: Vec<Layout> = namespaces
            .get(namespace)
            .map(|layouts| layouts.values().cloned().collect())
            .unwrap_or_default();
        layouts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(layouts)
    }

    async fn get(&self, namespace: &Namespace, id: LayoutId) -> Result<Option<Layout>> {
        let namespaces = lock(&self.namespaces);
        Ok(namespaces
            .get(namespace)
            .and_then(|layouts| layouts.get(&id))
            .cloned())
    }

    async fn put(&self, namespace: &Namespace, layout: Layout) -> Result<Layout> {
        lock(&self.namespaces)
            .entry(namespace.clone())
            .or_default()
            .insert(layout.id, layout.clone());
        Ok(layout)
    }

    async fn delete(&self, namespace: &Namespace, id: LayoutId) -> Result<()> {
        if let Some(layouts) = lock(&self.namespaces).get_mut(namespace) {
            layouts.remove(&id);
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
        let mut namespaces = lock(&self.namespaces);
        let source = namespaces.remove(from).unwrap_or_default();
        let target = namespaces.entry(to.clone()).or_default();
        let (moved, kept) = move_into(source, target, to);
        if !kept.is_empty() {
            namespaces.insert(from.clone(), kept);
        }
        Ok(moved)
    }

    async fn migrate_unnamespaced_layouts(&self, namespace: &Namespace) -> Result<usize> {
        let mut legacy = lock(&self.unnamespaced);
        let mut namespaces = lock(&self.namespaces);
        let target = namespaces.entry(namespace.clone()).or_default();
        let (moved, kept) = move_into(std::mem::take(&mut *legacy), target, namespace);
        *legacy = kept;
        Ok(moved)
    }
}

/// Move records into `target` without overwriting. Returns the number moved and the
/// clashing records that differ from their target.
fn move_into(
    source: HashMap<LayoutId, Layout>,
    target: &mut HashMap<LayoutId, Layout>,
    namespace: &Namespace,
) -> (usize, HashMap<LayoutId, Layout>) {
    let mut moved = 0;
    let mut kept = HashMap::new();
    for (id, layout) in source {
        match target.get(&id) {
            None => {
                target.insert(id, layout);
                moved += 1;
            }
            Some(existing) if *existing == layout => {}
            Some(_) => {
                log::warn!(
                    "Layout {} already present in namespace {} with different contents, keeping both",
                    id,
                    namespace
                );
                kept.insert(id, layout);
            }
        }
    }
    (moved, kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::LayoutPermission;
    use serde_json::json;

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let storage = MemoryLayoutStorage::new();
        let org = Namespace::Org("team".to_string());
        let layout = Layout::new("A".to_string(), json!({}), LayoutPermission::CreatorWrite);

        storage.put(&Namespace::Local, layout.clone()).await.unwrap();
        assert!(storage.get(&org, layout.id).await.unwrap().is_none());
        assert_eq!(storage.list(&Namespace::Local).await.unwrap(), vec![layout]);
    }

    #[tokio::test]
    async fn test_import_and_migrate() {
        let storage = MemoryLayoutStorage::new();
        let org = Namespace::Org("team".to_string());
        let local = Layout::new("Local".to_string(), json!({}), LayoutPermission::CreatorWrite);
        let legacy = Layout::new("Legacy".to_string(), json!({}), LayoutPermission::CreatorWrite);

        storage.put(&Namespace::Local, local.clone()).await.unwrap();
        storage.insert_unnamespaced(legacy.clone());

        assert_eq!(storage.migrate_unnamespaced_layouts(&org).await.unwrap(), 1);
        assert_eq!(storage.import_layouts(&Namespace::Local, &org).await.unwrap(), 1);

        let names: Vec<String> = storage.list(&org).await.unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Legacy", "Local"]);
        assert!(storage.list(&Namespace::Local).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_differing_clash_stays_in_source() {
        let storage = MemoryLayoutStorage::new();
        let org = Namespace::Org("team".to_string());
        let same = Layout::new("Same".to_string(), json!({}), LayoutPermission::CreatorWrite);
        let local = Layout::new("Local".to_string(), json!({}), LayoutPermission::CreatorWrite);
        let org_copy = Layout {
            name: "Org".to_string(),
            ..local.clone()
        };

        storage.put(&Namespace::Local, same.clone()).await.unwrap();
        storage.put(&Namespace::Local, local.clone()).await.unwrap();
        storage.put(&org, same.clone()).await.unwrap();
        storage.put(&org, org_copy.clone()).await.unwrap();

        assert_eq!(storage.import_layouts(&Namespace::Local, &org).await.unwrap(), 0);
        assert_eq!(storage.list(&Namespace::Local).await.unwrap(), vec![local.clone()]);
        assert_eq!(storage.get(&org, local.id).await.unwrap(), Some(org_copy.clone()));

        storage.insert_unnamespaced(local.clone());
        assert_eq!(storage.migrate_unnamespaced_layouts(&org).await.unwrap(), 0);
        assert_eq!(storage.get(&org, local.id).await.unwrap(), Some(org_copy));
        assert_eq!(lock(&storage.unnamespaced).len(), 1);
    }
}
