use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use crate::error::ProgressError;
use crate::offline::store::KvStore;
use crate::progress::intent::{DayMutation, MutationIntent, ReadingMutation};
use crate::progress::record::CompletionRecord;
use crate::sync::remote::{send_intent, ProgressStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Reading,
    Day,
}

impl ActionType {
    fn as_str(&self) -> &'static str {
        match self {
            ActionType::Reading => "reading",
            ActionType::Day => "day",
        }
    }
}

/// A mutation that could not reach the server, persisted for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAction {
    pub key: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub plan_id: String,
    pub day: u32,
    #[serde(default)]
    pub reading_index: Option<usize>,
    pub completed: bool,
    #[serde(default)]
    pub chapter_count: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_chapters: Option<Vec<String>>,
    #[serde(default)]
    pub total_items: usize,
    pub created_at: DateTime<Utc>,
}

/// Coalescing key: one pending action per (user, type, plan, day, item).
///
/// Hashed so that identifiers containing separators cannot collide.
pub fn action_key(
    user_id: &str,
    action_type: ActionType,
    plan_id: &str,
    day: u32,
    reading_index: Option<usize>,
) -> String {
    let index = reading_index.map_or_else(|| "-".to_string(), |i| i.to_string());
    let day = day.to_string();
    let mut hasher = Sha256::new();
    for part in [user_id, action_type.as_str(), plan_id, day.as_str(), index.as_str()] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

impl OfflineAction {
    pub fn from_intent(user_id: &str, intent: &MutationIntent, created_at: DateTime<Utc>) -> Self {
        match intent {
            MutationIntent::Reading(m) => OfflineAction {
                key: action_key(user_id, ActionType::Reading, &m.plan_id, m.day, Some(m.reading_index)),
                user_id: user_id.to_string(),
                action_type: ActionType::Reading,
                plan_id: m.plan_id.clone(),
                day: m.day,
                reading_index: Some(m.reading_index),
                completed: m.completed,
                chapter_count: m.chapter_count,
                completed_chapters: m.completed_chapters.clone(),
                total_items: 0,
                created_at,
            },
            MutationIntent::Day(m) => OfflineAction {
                key: action_key(user_id, ActionType::Day, &m.plan_id, m.day, None),
                user_id: user_id.to_string(),
                action_type: ActionType::Day,
                plan_id: m.plan_id.clone(),
                day: m.day,
                reading_index: None,
                completed: m.completed,
                chapter_count: 0.0,
                completed_chapters: None,
                total_items: m.total_items,
                created_at,
            },
        }
    }

    /// Rebuild the intent this action was queued for.
    /// A reading action without an index is corrupt and yields `None`.
    pub fn to_intent(&self) -> Option<MutationIntent> {
        match self.action_type {
            ActionType::Reading => Some(MutationIntent::Reading(ReadingMutation {
                plan_id: self.plan_id.clone(),
                day: self.day,
                reading_index: self.reading_index?,
                completed: self.completed,
                chapter_count: self.chapter_count,
                completed_chapters: self.completed_chapters.clone(),
            })),
            ActionType::Day => Some(MutationIntent::Day(DayMutation {
                plan_id: self.plan_id.clone(),
                day: self.day,
                completed: self.completed,
                total_items: self.total_items,
            })),
        }
    }
}

/// Result of one drain of a user's queue.
#[derive(Debug, Default)]
pub struct ReplayReport {
    pub replayed: usize,
    pub remaining: usize,
    /// The failure that stopped the drain, if any
    pub halted_on: Option<ProgressError>,
    /// Last server record per plan whose queued actions all went through
    pub settled: HashMap<String, CompletionRecord>,
}

impl ReplayReport {
    pub fn is_halted(&self) -> bool {
        self.halted_on.is_some()
    }
}

/// Per-user durable queue of mutations awaiting connectivity.
#[derive(Clone)]
pub struct OfflineQueue {
    store: Arc<dyn KvStore>,
    last_stamp: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        OfflineQueue {
            store,
            last_stamp: Arc::new(Mutex::new(None)),
        }
    }

    /// Strictly increasing timestamps, so replay order matches enqueue order
    /// even when the clock does not advance between two calls.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_stamp.lock();
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + ChronoDuration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }

    /// Persist an intent, overwriting any pending action with the same key
    pub async fn enqueue(&self, user_id: &str, intent: &MutationIntent) -> Result<OfflineAction, ProgressError> {
        let action = OfflineAction::from_intent(user_id, intent, self.next_timestamp());
        self.store.put(&action).await?;
        tracing::debug!(
            user_id = user_id,
            plan_id = %action.plan_id,
            day = action.day,
            "Queued offline action"
        );
        Ok(action)
    }

    /// The user's pending actions, oldest first
    pub async fn pending(&self, user_id: &str) -> Result<Vec<OfflineAction>, ProgressError> {
        let mut actions: Vec<OfflineAction> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|a| a.user_id == user_id)
            .collect();
        actions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(actions)
    }

    pub async fn pending_for_plan(&self, user_id: &str, plan_id: &str) -> Result<Vec<OfflineAction>, ProgressError> {
        let mut actions = self.pending(user_id).await?;
        actions.retain(|a| a.plan_id == plan_id);
        Ok(actions)
    }

    /// Remove the action stored under `key` if it was queued before `before`.
    /// Returns true when something was removed.
    pub async fn remove_if_older(&self, key: &str, before: DateTime<Utc>) -> Result<bool, ProgressError> {
        let stored = self.store.get_all().await?.into_iter().find(|a| a.key == key);
        match stored {
            Some(action) if action.created_at < before => self.store.delete_matching(&action).await,
            _ => Ok(false),
        }
    }

    /// Delete every action belonging to `user_id`. Returns how many were removed.
    pub async fn purge_user(&self, user_id: &str) -> Result<usize, ProgressError> {
        let actions = self.pending(user_id).await?;
        for action in &actions {
            self.store.delete(&action.key).await?;
        }
        if !actions.is_empty() {
            tracing::info!(user_id = user_id, purged = actions.len(), "Purged offline queue");
        }
        Ok(actions.len())
    }

    /// Send the user's actions in creation order, stopping at the first failure.
    ///
    /// Each success deletes its action before the next one is sent. Storage
    /// errors abort the drain with `Err`; remote failures end it with
    /// `halted_on` set and the failed action still queued.
    pub async fn drain(&self, user_id: &str, remote: &dyn ProgressStore) -> Result<ReplayReport, ProgressError> {
        let actions = self.pending(user_id).await?;
        let mut report = ReplayReport::default();

        for (position, action) in actions.iter().enumerate() {
            let Some(intent) = action.to_intent() else {
                tracing::warn!(key = %action.key, "Dropping malformed offline action");
                self.store.delete(&action.key).await?;
                continue;
            };

            match send_intent(remote, &intent).await {
                Ok(record) => {
                    if !self.store.delete_matching(action).await? {
                        tracing::debug!(key = %action.key, "Action was re-queued during replay");
                    }
                    report.replayed += 1;
                    report.settled.insert(action.plan_id.clone(), record);
                }
                Err(e) => {
                    tracing::warn!(error = %e, plan_id = %action.plan_id, "Replay failed");
                    let unsent = &actions[position..];
                    let blocked: BTreeSet<&str> = unsent.iter().map(|a| a.plan_id.as_str()).collect();
                    report.settled.retain(|plan_id, _| !blocked.contains(plan_id.as_str()));
                    report.remaining = unsent.len();
                    report.halted_on = Some(e);
                    return Ok(report);
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::store::MemoryStore;

    fn reading(plan: &str, day: u32, idx: usize, completed: bool) -> MutationIntent {
        MutationIntent::Reading(ReadingMutation {
            plan_id: plan.into(),
            day,
            reading_index: idx,
            completed,
            chapter_count: 1.0,
            completed_chapters: None,
        })
    }

    #[test]
    fn test_key_depends_on_every_component() {
        let base = action_key("u", ActionType::Reading, "p", 1, Some(0));
        assert_eq!(base, action_key("u", ActionType::Reading, "p", 1, Some(0)));
        assert_ne!(base, action_key("v", ActionType::Reading, "p", 1, Some(0)));
        assert_ne!(base, action_key("u", ActionType::Day, "p", 1, None));
        assert_ne!(base, action_key("u", ActionType::Reading, "p", 1, Some(1)));
        assert_ne!(
            action_key("a:b", ActionType::Day, "c", 1, None),
            action_key("a", ActionType::Day, "b:c", 1, None)
        );
    }

    #[test]
    fn test_action_round_trips_intent() {
        let intent = MutationIntent::Day(DayMutation {
            plan_id: "p".into(),
            day: 4,
            completed: true,
            total_items: 3,
        });
        let action = OfflineAction::from_intent("u", &intent, Utc::now());
        assert_eq!(action.to_intent(), Some(intent));
    }

    #[tokio::test]
    async fn test_enqueue_coalesces_same_item() {
        let store = Arc::new(MemoryStore::new());
        let queue = OfflineQueue::new(store.clone());

        queue.enqueue("u", &reading("p", 1, 0, true)).await.unwrap();
        queue.enqueue("u", &reading("p", 1, 0, false)).await.unwrap();
        queue.enqueue("u", &reading("p", 1, 1, true)).await.unwrap();

        let pending = queue.pending("u").await.unwrap();
        assert_eq!(pending.len(), 2);
        let first = pending.iter().find(|a| a.reading_index == Some(0)).unwrap();
        assert!(!first.completed);
    }

    #[tokio::test]
    async fn test_pending_is_oldest_first_and_per_user() {
        let queue = OfflineQueue::new(Arc::new(MemoryStore::new()));
        queue.enqueue("u", &reading("p", 3, 0, true)).await.unwrap();
        queue.enqueue("other", &reading("p", 2, 0, true)).await.unwrap();
        queue.enqueue("u", &reading("p", 1, 0, true)).await.unwrap();

        let days: Vec<u32> = queue.pending("u").await.unwrap().iter().map(|a| a.day).collect();
        assert_eq!(days, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_purge_only_touches_one_user() {
        let store = Arc::new(MemoryStore::new());
        let queue = OfflineQueue::new(store.clone());
        queue.enqueue("u", &reading("p", 1, 0, true)).await.unwrap();
        queue.enqueue("u", &reading("p", 2, 0, true)).await.unwrap();
        queue.enqueue("other", &reading("p", 1, 0, true)).await.unwrap();

        assert_eq!(queue.purge_user("u").await.unwrap(), 2);
        assert!(queue.pending("u").await.unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let queue = OfflineQueue::new(Arc::new(MemoryStore::new()));
        let a = queue.next_timestamp();
        let b = queue.next_timestamp();
        let c = queue.next_timestamp();
        assert!(a < b && b < c);
    }
}
