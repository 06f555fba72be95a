use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use tokio::sync::Mutex;
use crate::error::ProgressError;
use crate::offline::queue::OfflineAction;
use crate::offline::store::KvStore;

const QUEUE_FILE: &str = "offline_queue.json";

type ActionMap = BTreeMap<String, OfflineAction>;

/// Queue storage backed by a single JSON file.
///
/// The file is loaded lazily on first access and rewritten through a
/// temporary file on every change, so a crash mid-write leaves the previous
/// contents intact.
pub struct JsonFileStore {
    path: PathBuf,
    actions: Mutex<Option<ActionMap>>,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        JsonFileStore {
            path: path.into(),
            actions: Mutex::new(None),
        }
    }

    /// Store at `<dir>/offline_queue.json`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(QUEUE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> Result<ActionMap, ProgressError> {
        let data = match tokio::fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ActionMap::new()),
            Err(e) => {
                return Err(ProgressError::from(e).with_context(format!("path: {:?}", path)));
            }
        };

        match serde_json::from_str::<Vec<OfflineAction>>(&data) {
            Ok(actions) => Ok(actions.into_iter().map(|a| (a.key.clone(), a)).collect()),
            Err(e) => {
                // Keep the unreadable file for inspection rather than overwriting it
                let aside = path.with_extension("json.corrupt");
                tracing::warn!(
                    path = ?path,
                    moved_to = ?aside,
                    error = %e,
                    "Offline queue file is corrupt, starting empty"
                );
                tokio::fs::rename(path, &aside).await?;
                Ok(ActionMap::new())
            }
        }
    }

    async fn persist(&self, actions: &ActionMap) -> Result<(), ProgressError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ProgressError::storage(format!("Failed to create directory: {}", e), "io")
                    .with_context(format!("path: {:?}", parent))
            })?;
        }

        let list: Vec<&OfflineAction> = actions.values().collect();
        let json = serde_json::to_string_pretty(&list).map_err(|e| {
            ProgressError::storage(format!("Failed to serialize offline queue: {}", e), "json_serialize")
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            ProgressError::storage(format!("Failed to write offline queue: {}", e), "io")
                .with_context(format!("path: {:?}", tmp))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            ProgressError::storage(format!("Failed to replace offline queue: {}", e), "io")
                .with_context(format!("path: {:?}", self.path))
        })?;
        Ok(())
    }

    /// Run `f` on the loaded map and persist the result if it reports a change
    async fn modify<T, F>(&self, f: F) -> Result<T, ProgressError>
    where
        F: FnOnce(&mut ActionMap) -> (T, bool),
    {
        let mut guard = self.actions.lock().await;
        if guard.is_none() {
            *guard = Some(Self::load(&self.path).await?);
        }
        let Some(actions) = guard.as_mut() else {
            return Err(ProgressError::storage("Offline queue not loaded", "io"));
        };

        let mut updated = actions.clone();
        let (value, changed) = f(&mut updated);
        if changed {
            self.persist(&updated).await?;
            *actions = updated;
        }
        Ok(value)
    }
}

#[async_trait]
impl KvStore for JsonFileStore {
    async fn put(&self, action: &OfflineAction) -> Result<(), ProgressError> {
        self.modify(|actions| {
            actions.insert(action.key.clone(), action.clone());
            ((), true)
        })
        .await
    }

    async fn get_all(&self) -> Result<Vec<OfflineAction>, ProgressError> {
        self.modify(|actions| (actions.values().cloned().collect(), false))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), ProgressError> {
        self.modify(|actions| ((), actions.remove(key).is_some()))
            .await
    }

    async fn delete_matching(&self, action: &OfflineAction) -> Result<bool, ProgressError> {
        self.modify(|actions| match actions.get(&action.key) {
            Some(stored) if stored != action => (false, false),
            Some(_) => {
                actions.remove(&action.key);
                (true, true)
            }
            None => (true, false),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::queue::OfflineQueue;
    use crate::progress::intent::{DayMutation, MutationIntent};
    use std::sync::Arc;

    fn day_intent(day: u32) -> MutationIntent {
        MutationIntent::Day(DayMutation {
            plan_id: "plan".into(),
            day,
            completed: true,
            total_items: 1,
        })
    }

    #[tokio::test]
    async fn test_queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let queue = OfflineQueue::new(Arc::new(JsonFileStore::in_dir(dir.path())));
        queue.enqueue("u", &day_intent(1)).await.unwrap();
        queue.enqueue("u", &day_intent(2)).await.unwrap();
        drop(queue);

        let reopened = OfflineQueue::new(Arc::new(JsonFileStore::in_dir(dir.path())));
        let days: Vec<u32> = reopened.pending("u").await.unwrap().iter().map(|a| a.day).collect();
        assert_eq!(days, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(&dir.path().join("nested"));
        assert!(store.get_all().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(QUEUE_FILE);
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.get_all().await.unwrap().is_empty());
        assert!(dir.path().join("offline_queue.json.corrupt").exists());
    }

    #[tokio::test]
    async fn test_delete_matching_keeps_newer_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::in_dir(dir.path()));
        let queue = OfflineQueue::new(store.clone());

        let old = queue.enqueue("u", &day_intent(1)).await.unwrap();
        let newer = queue.enqueue("u", &day_intent(1)).await.unwrap();
        assert_eq!(old.key, newer.key);

        assert!(!store.delete_matching(&old).await.unwrap());
        assert_eq!(store.get_all().await.unwrap(), vec![newer.clone()]);
        assert!(store.delete_matching(&newer).await.unwrap());
        assert!(store.get_all().await.unwrap().is_empty());
    }
}
