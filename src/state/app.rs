use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::cache::{CachedRangeSource, RangeCache};
use crate::metrics::Metrics;
use crate::progress::record::CompletionRecord;
use crate::schedule::{total_reading_items, ScheduleEntry, VerseTable};
use crate::state::session::SessionState;

/// Application-wide state container.
/// All mutable state is centralized here and passed explicitly to the engine.
/// Locks are never held across an `.await`.
#[derive(Clone)]
pub struct AppState {
    /// Local mirror of each plan's completion record
    pub records: Arc<RwLock<HashMap<String, CompletionRecord>>>,
    /// Immutable schedules, registered once per plan
    pub schedules: Arc<RwLock<HashMap<String, Arc<Vec<ScheduleEntry>>>>>,
    /// Latest issued mutation sequence per plan
    pub sequences: Arc<RwLock<HashMap<String, u64>>>,
    /// Bumped to cancel in-flight reads of a plan
    pub query_epochs: Arc<RwLock<HashMap<String, u64>>>,
    pub session: Arc<RwLock<SessionState>>,
    pub verses: Arc<RwLock<Arc<VerseTable>>>,
    /// Parsed range memo (LRU with bounded size)
    pub range_cache: Arc<RangeCache>,
    pub metrics: Metrics,
}

impl AppState {
    /// Create a new AppState with default values
    pub fn new() -> Self {
        Self::with_cache_capacity(512)
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        AppState {
            records: Arc::new(RwLock::new(HashMap::new())),
            schedules: Arc::new(RwLock::new(HashMap::new())),
            sequences: Arc::new(RwLock::new(HashMap::new())),
            query_epochs: Arc::new(RwLock::new(HashMap::new())),
            session: Arc::new(RwLock::new(SessionState::SignedOut)),
            verses: Arc::new(RwLock::new(Arc::new(VerseTable::new()))),
            range_cache: Arc::new(RangeCache::new(capacity)),
            metrics: Metrics::new(),
        }
    }

    /// Cached record for a plan; an unknown plan reads as empty
    pub fn get_record(&self, plan_id: &str) -> CompletionRecord {
        self.records.read().get(plan_id).cloned().unwrap_or_default()
    }

    /// Replace a plan's record wholesale
    pub fn set_record(&self, plan_id: &str, record: CompletionRecord) {
        self.records.write().insert(plan_id.to_string(), record);
    }

    /// Mutate a plan's record in place and return the state before the change
    pub fn update_record<F>(&self, plan_id: &str, f: F) -> CompletionRecord
    where
        F: FnOnce(&mut CompletionRecord),
    {
        let mut records = self.records.write();
        let record = records.entry(plan_id.to_string()).or_default();
        let before = record.clone();
        f(record);
        before
    }

    pub fn set_schedule(&self, plan_id: &str, schedule: Vec<ScheduleEntry>) {
        self.schedules
            .write()
            .insert(plan_id.to_string(), Arc::new(schedule));
    }

    pub fn get_schedule(&self, plan_id: &str) -> Option<Arc<Vec<ScheduleEntry>>> {
        self.schedules.read().get(plan_id).cloned()
    }

    /// Items scheduled on `day`, when the plan's schedule is registered
    pub fn total_items(&self, plan_id: &str, day: u32) -> Option<usize> {
        self.get_schedule(plan_id)
            .map(|schedule| total_reading_items(&schedule, day))
    }

    /// Issue the next sequence number for a plan
    pub fn next_sequence(&self, plan_id: &str) -> u64 {
        let mut sequences = self.sequences.write();
        let seq = sequences.entry(plan_id.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    pub fn latest_sequence(&self, plan_id: &str) -> u64 {
        self.sequences.read().get(plan_id).copied().unwrap_or(0)
    }

    pub fn is_latest(&self, plan_id: &str, seq: u64) -> bool {
        self.latest_sequence(plan_id) == seq
    }

    pub fn query_epoch(&self, plan_id: &str) -> u64 {
        self.query_epochs.read().get(plan_id).copied().unwrap_or(0)
    }

    /// Invalidate every read of this plan that is currently in flight
    pub fn cancel_queries(&self, plan_id: &str) -> u64 {
        let mut epochs = self.query_epochs.write();
        let epoch = epochs.entry(plan_id.to_string()).or_insert(0);
        *epoch += 1;
        *epoch
    }

    pub fn get_session(&self) -> SessionState {
        self.session.read().clone()
    }

    pub fn set_session(&self, session: SessionState) {
        *self.session.write() = session;
    }

    pub fn verse_table(&self) -> Arc<VerseTable> {
        self.verses.read().clone()
    }

    /// Swap the verse table; cached ranges were parsed against the old one
    pub fn set_verse_table(&self, table: VerseTable) {
        *self.verses.write() = Arc::new(table);
        self.range_cache.clear();
    }

    /// Run `f` with a range source backed by the shared cache
    pub fn with_range_source<T>(&self, f: impl FnOnce(&CachedRangeSource<'_>) -> T) -> T {
        let verses = self.verse_table();
        let source = CachedRangeSource {
            cache: &self.range_cache,
            verses: &verses,
        };
        f(&source)
    }

    /// Drop everything that belongs to the signed-in user
    pub fn clear_user_data(&self) {
        self.records.write().clear();
        self.query_epochs.write().clear();
        *self.session.write() = SessionState::SignedOut;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_are_per_plan() {
        let state = AppState::new();
        assert_eq!(state.next_sequence("a"), 1);
        assert_eq!(state.next_sequence("a"), 2);
        assert_eq!(state.next_sequence("b"), 1);
        assert!(state.is_latest("a", 2));
        assert!(!state.is_latest("a", 1));
    }

    #[test]
    fn test_update_record_returns_previous_state() {
        let state = AppState::new();
        let before = state.update_record("a", |r| r.apply_day(1, true, 2));
        assert_eq!(before, CompletionRecord::new());
        assert!(state.get_record("a").is_day_complete(1));
    }

    #[test]
    fn test_clear_user_data_keeps_schedules() {
        let state = AppState::new();
        state.set_schedule("a", Vec::new());
        state.update_record("a", |r| r.apply_day(1, true, 1));
        state.set_session(SessionState::SignedIn { user_id: "u1".into() });

        state.clear_user_data();
        assert_eq!(state.get_record("a"), CompletionRecord::new());
        assert!(state.get_schedule("a").is_some());
        assert_eq!(state.get_session(), SessionState::SignedOut);
    }

    #[test]
    fn test_new_verse_table_clears_range_cache() {
        let state = AppState::new();
        state.with_range_source(|source| {
            use crate::parsing::RangeSource;
            source.ranges("룻기", "1장")
        });
        assert_eq!(state.range_cache.len(), 1);
        state.set_verse_table(VerseTable::new().with_book("룻기", vec![22]));
        assert!(state.range_cache.is_empty());
    }
}
