use std::collections::BTreeMap;
use async_trait::async_trait;
use parking_lot::RwLock;
use crate::error::ProgressError;
use crate::offline::queue::OfflineAction;

/// Durable key-value storage for queued actions.
///
/// Implementations must survive process restart (except `MemoryStore`,
/// which exists for tests and ephemeral sessions).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Insert or overwrite the action stored under `action.key`
    async fn put(&self, action: &OfflineAction) -> Result<(), ProgressError>;

    async fn get_all(&self) -> Result<Vec<OfflineAction>, ProgressError>;

    async fn delete(&self, key: &str) -> Result<(), ProgressError>;

    /// Delete `action.key` only if the stored action is still `action`.
    /// Returns false when a newer action was written under the same key.
    async fn delete_matching(&self, action: &OfflineAction) -> Result<bool, ProgressError> {
        let current = self
            .get_all()
            .await?
            .into_iter()
            .find(|stored| stored.key == action.key);
        match current {
            Some(stored) if stored == *action => {
                self.delete(&action.key).await?;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(true),
        }
    }
}

/// In-process store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    actions: RwLock<BTreeMap<String, OfflineAction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.actions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn put(&self, action: &OfflineAction) -> Result<(), ProgressError> {
        self.actions.write().insert(action.key.clone(), action.clone());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<OfflineAction>, ProgressError> {
        Ok(self.actions.read().values().cloned().collect())
    }

    async fn delete(&self, key: &str) -> Result<(), ProgressError> {
        self.actions.write().remove(key);
        Ok(())
    }

    async fn delete_matching(&self, action: &OfflineAction) -> Result<bool, ProgressError> {
        let mut actions = self.actions.write();
        match actions.get(&action.key) {
            Some(stored) if stored != action => Ok(false),
            _ => {
                actions.remove(&action.key);
                Ok(true)
            }
        }
    }
}
