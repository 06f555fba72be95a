#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::oneshot;
use readplan_lib::progress::{DayMutation, ReadingMutation};
use readplan_lib::schedule::total_reading_items;
use readplan_lib::{
    AppState, CompletionRecord, ConnectivityFlag, MemoryStore, MutationIntent, OfflineQueue,
    ProgressError, ProgressStore, ReadingItem, ScheduleEntry, SyncEngine,
};

pub const PLAN: &str = "plan-1";
pub const USER: &str = "user-1";

/// Three days: Genesis 1-2 and Matthew 1, Genesis 3 and Matthew 2, Genesis 3 again
pub fn schedule() -> Vec<ScheduleEntry> {
    vec![
        ScheduleEntry {
            day: 1,
            readings: vec![ReadingItem::new("창세기", "1-2장"), ReadingItem::new("마태복음", "1장")],
        },
        ScheduleEntry {
            day: 2,
            readings: vec![ReadingItem::new("창세기", "3장"), ReadingItem::new("마태복음", "2장")],
        },
        ScheduleEntry {
            day: 3,
            readings: vec![ReadingItem::new("창세기", "3장")],
        },
    ]
}

pub fn reading(day: u32, reading_index: usize, completed: bool) -> MutationIntent {
    MutationIntent::Reading(ReadingMutation {
        plan_id: PLAN.to_string(),
        day,
        reading_index,
        completed,
        chapter_count: 1.0,
        completed_chapters: None,
    })
}

pub fn day(day: u32, completed: bool, total_items: usize) -> MutationIntent {
    MutationIntent::Day(DayMutation {
        plan_id: PLAN.to_string(),
        day,
        completed,
        total_items,
    })
}

struct Hold {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// In-memory server that applies mutations to its own records and can be
/// told to fail or to stall its next call.
pub struct ScriptedStore {
    schedule: Vec<ScheduleEntry>,
    records: Mutex<HashMap<String, CompletionRecord>>,
    failures: Mutex<VecDeque<Option<ProgressError>>>,
    calls: Mutex<Vec<String>>,
    hold: Mutex<Option<Hold>>,
}

impl ScriptedStore {
    pub fn new(schedule: Vec<ScheduleEntry>) -> Self {
        ScriptedStore {
            schedule,
            records: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            hold: Mutex::new(None),
        }
    }

    /// Script the next unscripted call to fail with `error`
    pub fn fail_next(&self, error: ProgressError) {
        self.failures.lock().unwrap().push_back(Some(error));
    }

    /// Script the next unscripted call to succeed
    pub fn succeed_next(&self) {
        self.failures.lock().unwrap().push_back(None);
    }

    /// Stall the next call after it has been applied server-side.
    /// Returns a receiver that fires once the call has arrived and a sender
    /// that lets it respond.
    pub fn hold_next(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(Hold {
            entered: entered_tx,
            release: release_rx,
        });
        (entered_rx, release_tx)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn server_record(&self, plan_id: &str) -> CompletionRecord {
        self.records.lock().unwrap().get(plan_id).cloned().unwrap_or_default()
    }

    pub fn seed(&self, plan_id: &str, record: CompletionRecord) {
        self.records.lock().unwrap().insert(plan_id.to_string(), record);
    }

    async fn handle(
        &self,
        plan_id: &str,
        call: String,
        intent: Option<MutationIntent>,
    ) -> Result<CompletionRecord, ProgressError> {
        self.calls.lock().unwrap().push(call);
        let failure = self.failures.lock().unwrap().pop_front().flatten();
        if let Some(error) = failure {
            return Err(error);
        }

        let snapshot = {
            let mut records = self.records.lock().unwrap();
            let record = records.entry(plan_id.to_string()).or_default();
            if let Some(intent) = &intent {
                let total = total_reading_items(&self.schedule, intent.day());
                intent.apply_to(record, Some(total));
            }
            record.clone()
        };

        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            let _ = hold.entered.send(());
            let _ = hold.release.await;
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl ProgressStore for ScriptedStore {
    async fn get_progress(&self, plan_id: &str) -> Result<CompletionRecord, ProgressError> {
        self.handle(plan_id, format!("get:{}", plan_id), None).await
    }

    async fn update_reading_progress(
        &self,
        plan_id: &str,
        day: u32,
        reading_index: usize,
        completed: bool,
        chapter_count: f64,
        completed_chapters: Option<&[String]>,
    ) -> Result<CompletionRecord, ProgressError> {
        let intent = MutationIntent::Reading(ReadingMutation {
            plan_id: plan_id.to_string(),
            day,
            reading_index,
            completed,
            chapter_count,
            completed_chapters: completed_chapters.map(|c| c.to_vec()),
        });
        let call = format!("reading:{}:{}:{}", day, reading_index, completed);
        self.handle(plan_id, call, Some(intent)).await
    }

    async fn update_day_progress(
        &self,
        plan_id: &str,
        day: u32,
        completed: bool,
    ) -> Result<CompletionRecord, ProgressError> {
        let intent = MutationIntent::Day(DayMutation {
            plan_id: plan_id.to_string(),
            day,
            completed,
            total_items: 0,
        });
        let call = format!("day:{}:{}", day, completed);
        self.handle(plan_id, call, Some(intent)).await
    }
}

pub struct Harness {
    pub engine: Arc<SyncEngine>,
    pub remote: Arc<ScriptedStore>,
    pub store: Arc<MemoryStore>,
    pub online: ConnectivityFlag,
}

impl Harness {
    pub async fn pending_len(&self) -> usize {
        self.engine.queue().pending(USER).await.unwrap().len()
    }
}

/// Engine signed in as `USER` with `PLAN` registered, online, no cooldown
pub async fn harness() -> Harness {
    let remote = Arc::new(ScriptedStore::new(schedule()));
    let store = Arc::new(MemoryStore::new());
    let online = ConnectivityFlag::new(true);
    let engine = Arc::new(SyncEngine::new(
        AppState::new(),
        remote.clone(),
        Arc::new(online.clone()),
        OfflineQueue::new(store.clone()),
        Duration::ZERO,
    ));
    engine.sign_in(USER).await.unwrap();
    engine.register_plan(PLAN, schedule());
    Harness {
        engine,
        remote,
        store,
        online,
    }
}

pub fn offline_error() -> ProgressError {
    ProgressError::network("Failed to fetch", "remote")
}

pub fn rejection() -> ProgressError {
    ProgressError::rejected("Progress store answered 403: forbidden", "update_reading").with_status(403)
}
