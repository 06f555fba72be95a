use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use crate::circuit_breaker::{CircuitBreaker, ExponentialBackoff};
use crate::config::settings::SyncConfig;
use crate::error::{ErrorKind, ProgressError};
use crate::logging::{log_mutation_outcome, log_replay};
use crate::offline::queue::{action_key, ActionType, OfflineQueue, ReplayReport};
use crate::progress::aggregate::{
    book_occurrences, chapter_status, compute_chapters_totals, day_statuses, occurrences_for,
    plan_summary, ChapterStatus, ChapterTotals, DayStatus, PlanSummary,
};
use crate::progress::cluster::{cluster_readings, ChapterInstance};
use crate::progress::intent::MutationIntent;
use crate::progress::record::CompletionRecord;
use crate::progress::toggle::{toggle_day, ToggleController};
use crate::schedule::ScheduleEntry;
use crate::state::app::AppState;
use crate::state::session::{current_user, log_session, SessionState};
use crate::sync::connectivity::Connectivity;
use crate::sync::remote::{send_intent, ProgressStore};

/// How a submitted intent ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Server accepted it and its record is now the cached one
    Applied,
    /// Server accepted it but a newer intent for the plan was already issued
    Stale,
    /// Connectivity was unavailable; the intent waits in the offline queue
    Queued,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Applied => "applied",
            SyncOutcome::Stale => "stale",
            SyncOutcome::Queued => "queued",
        }
    }
}

/// Optimistic mutation pipeline over a remote progress store.
///
/// Owns the record cache (through `AppState`), orders replies with per-plan
/// sequence numbers and falls back to the offline queue when the network is
/// unavailable.
pub struct SyncEngine {
    state: AppState,
    remote: Arc<dyn ProgressStore>,
    connectivity: Arc<dyn Connectivity>,
    queue: OfflineQueue,
    toggles: Mutex<ToggleController>,
}

impl SyncEngine {
    pub fn new(
        state: AppState,
        remote: Arc<dyn ProgressStore>,
        connectivity: Arc<dyn Connectivity>,
        queue: OfflineQueue,
        toggle_cooldown: Duration,
    ) -> Self {
        SyncEngine {
            state,
            remote,
            connectivity,
            queue,
            toggles: Mutex::new(ToggleController::new(toggle_cooldown)),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Switch the session to `user_id`. Signing in as someone else first
    /// drops the previous user's cached records and queued actions.
    pub async fn sign_in(&self, user_id: &str) -> Result<(), ProgressError> {
        if let Some(previous) = current_user(&self.state) {
            if previous != user_id {
                tracing::info!(previous = %previous, "Account switch, discarding previous user data");
                self.state.clear_user_data();
                self.queue.purge_user(&previous).await?;
            }
        }
        self.state.set_session(SessionState::SignedIn {
            user_id: user_id.to_string(),
        });
        log_session(&self.state);
        Ok(())
    }

    /// Purge the user's queued actions and forget their records.
    /// Local state is cleared even if the purge fails.
    pub async fn sign_out(&self) -> Result<usize, ProgressError> {
        let purged = match current_user(&self.state) {
            Some(user_id) => self.queue.purge_user(&user_id).await,
            None => Ok(0),
        };
        self.state.clear_user_data();
        log_session(&self.state);
        purged
    }

    /// Register the immutable schedule of a plan
    pub fn register_plan(&self, plan_id: &str, schedule: Vec<ScheduleEntry>) {
        tracing::debug!(plan_id = plan_id, days = schedule.len(), "Registered plan schedule");
        self.state.set_schedule(plan_id, schedule);
    }

    pub fn record(&self, plan_id: &str) -> CompletionRecord {
        self.state.get_record(plan_id)
    }

    fn schedule_for(&self, plan_id: &str) -> Result<Arc<Vec<ScheduleEntry>>, ProgressError> {
        self.state.get_schedule(plan_id).ok_or_else(|| {
            ProgressError::new("Plan schedule not registered", "schedule", ErrorKind::Config)
                .with_context(format!("plan_id: {}", plan_id))
        })
    }

    /// Re-apply the user's still-queued actions for `plan_id` on top of a
    /// server record, so queued edits stay visible until they replay.
    async fn overlay_pending(&self, plan_id: &str, mut record: CompletionRecord) -> CompletionRecord {
        let Some(user_id) = current_user(&self.state) else {
            return record;
        };
        match self.queue.pending_for_plan(&user_id, plan_id).await {
            Ok(actions) => {
                for intent in actions.iter().filter_map(|a| a.to_intent()) {
                    let total_items = self.state.total_items(plan_id, intent.day());
                    intent.apply_to(&mut record, total_items);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, plan_id = plan_id, "Could not read queued actions");
            }
        }
        record
    }

    /// Repair a server record against the plan's schedule, then lay the
    /// queued actions over it.
    async fn reconcile(&self, plan_id: &str, mut record: CompletionRecord) -> CompletionRecord {
        if let Some(schedule) = self.state.get_schedule(plan_id) {
            record.normalize(&schedule);
        }
        self.overlay_pending(plan_id, record).await
    }

    /// Lay the user's queued actions for `plan_id` over the cached record.
    ///
    /// For when the server cannot be asked: a fresh process then still sees
    /// the changes earlier runs queued. Dropped like a refresh if a mutation
    /// is issued meanwhile.
    pub async fn load_pending(&self, plan_id: &str) -> CompletionRecord {
        let epoch = self.state.query_epoch(plan_id);
        let record = self.overlay_pending(plan_id, self.state.get_record(plan_id)).await;
        if self.state.query_epoch(plan_id) != epoch {
            self.state.metrics.record_cancelled_query();
            return self.state.get_record(plan_id);
        }
        self.state.set_record(plan_id, record.clone());
        record
    }

    /// Fetch the authoritative record for a plan.
    ///
    /// Returns `Ok(None)` when a mutation for the plan was issued while the
    /// read was in flight; the result is then dropped.
    pub async fn refresh(&self, plan_id: &str) -> Result<Option<CompletionRecord>, ProgressError> {
        let epoch = self.state.query_epoch(plan_id);
        let fetched = self.remote.get_progress(plan_id).await?;
        let record = self.reconcile(plan_id, fetched).await;

        if self.state.query_epoch(plan_id) != epoch {
            self.state.metrics.record_cancelled_query();
            tracing::debug!(plan_id = plan_id, "Refresh superseded by a local mutation");
            return Ok(None);
        }
        self.state.set_record(plan_id, record.clone());
        Ok(Some(record))
    }

    /// Run one intent through issue, optimistic apply, dispatch and resolve.
    ///
    /// Only server rejections surface as `Err`. Offline-like failures are
    /// absorbed into the queue and reported as `SyncOutcome::Queued`.
    pub async fn submit(&self, intent: MutationIntent) -> Result<SyncOutcome, ProgressError> {
        let plan_id = intent.plan_id().to_string();
        let issued_at = Utc::now();

        let seq = self.state.next_sequence(&plan_id);
        self.state.metrics.record_issued();

        self.state.cancel_queries(&plan_id);
        let total_items = self.state.total_items(&plan_id, intent.day());
        let snapshot = self
            .state
            .update_record(&plan_id, |record| intent.apply_to(record, total_items));

        if !self.connectivity.is_online() {
            return self.enqueue_or_rollback(&plan_id, seq, snapshot, &intent).await;
        }

        let started = Instant::now();
        let result = send_intent(self.remote.as_ref(), &intent).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(server_record) => {
                self.drop_superseded(&intent, issued_at).await;
                let record = self.reconcile(&plan_id, server_record).await;
                if self.state.is_latest(&plan_id, seq) {
                    self.state.set_record(&plan_id, record);
                    self.state.metrics.record_applied();
                    log_mutation_outcome(&plan_id, seq, SyncOutcome::Applied.as_str(), Some(latency_ms));
                    Ok(SyncOutcome::Applied)
                } else {
                    self.state.metrics.record_stale();
                    log_mutation_outcome(&plan_id, seq, SyncOutcome::Stale.as_str(), Some(latency_ms));
                    Ok(SyncOutcome::Stale)
                }
            }
            Err(e) if e.is_offline_like() => {
                tracing::warn!(error = %e, plan_id = %plan_id, seq = seq, "Mutation hit an offline condition");
                self.enqueue_or_rollback(&plan_id, seq, snapshot, &intent).await
            }
            Err(e) => {
                tracing::warn!(error = %e, plan_id = %plan_id, seq = seq, "Mutation rejected");
                self.rollback(&plan_id, seq, snapshot);
                log_mutation_outcome(&plan_id, seq, "rejected", Some(latency_ms));
                Err(e)
            }
        }
    }

    /// An older queued action for the same item must not replay over a
    /// change the server just accepted.
    async fn drop_superseded(&self, intent: &MutationIntent, issued_at: DateTime<Utc>) {
        let Some(user_id) = current_user(&self.state) else {
            return;
        };
        let key = match intent {
            MutationIntent::Reading(m) => {
                action_key(&user_id, ActionType::Reading, &m.plan_id, m.day, Some(m.reading_index))
            }
            MutationIntent::Day(m) => action_key(&user_id, ActionType::Day, &m.plan_id, m.day, None),
        };
        match self.queue.remove_if_older(&key, issued_at).await {
            Ok(true) => tracing::debug!(plan_id = intent.plan_id(), "Dropped superseded offline action"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to drop superseded offline action"),
        }
    }

    async fn enqueue_or_rollback(
        &self,
        plan_id: &str,
        seq: u64,
        snapshot: CompletionRecord,
        intent: &MutationIntent,
    ) -> Result<SyncOutcome, ProgressError> {
        let Some(user_id) = current_user(&self.state) else {
            self.rollback(plan_id, seq, snapshot);
            return Err(ProgressError::storage(
                "No signed-in user to queue the change for",
                "offline_queue",
            ));
        };

        match self.queue.enqueue(&user_id, intent).await {
            Ok(_) => {
                self.state.metrics.record_queued();
                log_mutation_outcome(plan_id, seq, SyncOutcome::Queued.as_str(), None);
                Ok(SyncOutcome::Queued)
            }
            Err(e) => {
                tracing::error!(error = %e, plan_id = plan_id, "Failed to persist offline action");
                self.rollback(plan_id, seq, snapshot);
                Err(e)
            }
        }
    }

    fn rollback(&self, plan_id: &str, seq: u64, snapshot: CompletionRecord) {
        if self.state.is_latest(plan_id, seq) {
            self.state.set_record(plan_id, snapshot);
            self.state.metrics.record_rollback();
            tracing::info!(plan_id = plan_id, seq = seq, "Rolled back optimistic change");
        } else {
            tracing::debug!(plan_id = plan_id, seq = seq, "Skipped rollback, newer change issued");
        }
    }

    /// Submit intents in order, stopping at the first rejection
    pub async fn submit_all(&self, intents: Vec<MutationIntent>) -> Result<Vec<SyncOutcome>, ProgressError> {
        let mut outcomes = Vec::with_capacity(intents.len());
        for intent in intents {
            outcomes.push(self.submit(intent).await?);
        }
        Ok(outcomes)
    }

    /// Advance the completion cycle of one chapter in a plan.
    /// Activations inside the cooldown window return no outcomes.
    pub async fn toggle_chapter(
        &self,
        plan_id: &str,
        book: &str,
        token: &str,
    ) -> Result<Vec<SyncOutcome>, ProgressError> {
        let schedule = self.schedule_for(plan_id)?;
        let occurrences = occurrences_for(plan_id, &schedule, book, token);
        if occurrences.is_empty() {
            tracing::debug!(plan_id = plan_id, book = book, token = token, "Chapter not in plan");
            return Ok(Vec::new());
        }

        let record = self.state.get_record(plan_id);
        let intents = self.toggles.lock().toggle(book, token, &occurrences, &record);
        self.submit_all(intents).await
    }

    pub async fn toggle_day(&self, plan_id: &str, day: u32) -> Result<Option<SyncOutcome>, ProgressError> {
        let schedule = self.schedule_for(plan_id)?;
        let record = self.state.get_record(plan_id);
        match toggle_day(plan_id, &schedule, &record, day) {
            Some(intent) => self.submit(intent).await.map(Some),
            None => Ok(None),
        }
    }

    /// Drain the signed-in user's queue.
    ///
    /// For every plan whose queued actions all went through, the last server
    /// record is applied unless a newer local mutation was issued meanwhile.
    pub async fn replay_pending(&self) -> Result<ReplayReport, ProgressError> {
        let Some(user_id) = current_user(&self.state) else {
            return Ok(ReplayReport::default());
        };

        let sequences_before: HashMap<String, u64> = self.state.sequences.read().clone();
        let report = self.queue.drain(&user_id, self.remote.as_ref()).await?;

        if current_user(&self.state).as_deref() == Some(user_id.as_str()) {
            for (plan_id, record) in &report.settled {
                let record = self.reconcile(plan_id, record.clone()).await;
                let before = sequences_before.get(plan_id).copied().unwrap_or(0);
                if self.state.latest_sequence(plan_id) == before {
                    self.state.cancel_queries(plan_id);
                    self.state.set_record(plan_id, record);
                }
            }
        }

        self.state.metrics.record_replayed(report.replayed as u64);
        if report.replayed > 0 || report.is_halted() {
            log_replay(&user_id, report.replayed, report.remaining, report.is_halted());
        }
        Ok(report)
    }

    pub fn chapter_totals(&self, plan_id: &str, up_to_day: Option<u32>) -> Result<ChapterTotals, ProgressError> {
        let schedule = self.schedule_for(plan_id)?;
        Ok(compute_chapters_totals(&schedule, &self.state.get_record(plan_id), up_to_day))
    }

    pub fn chapter_status(&self, plan_id: &str, book: &str, token: &str) -> Result<ChapterStatus, ProgressError> {
        let schedule = self.schedule_for(plan_id)?;
        Ok(chapter_status(&schedule, &self.state.get_record(plan_id), book, token))
    }

    pub fn day_statuses(&self, plan_id: &str) -> Result<Vec<DayStatus>, ProgressError> {
        let schedule = self.schedule_for(plan_id)?;
        Ok(day_statuses(&schedule, &self.state.get_record(plan_id)))
    }

    pub fn summary(&self, plan_id: &str, up_to_day: Option<u32>) -> Result<PlanSummary, ProgressError> {
        let schedule = self.schedule_for(plan_id)?;
        Ok(plan_summary(&schedule, &self.state.get_record(plan_id), up_to_day))
    }

    /// Reading passes of one book in a plan, through the shared range cache
    pub fn cluster_book(&self, plan_id: &str, book: &str) -> Result<Vec<ChapterInstance>, ProgressError> {
        let schedule = self.schedule_for(plan_id)?;
        let occurrences = book_occurrences(&schedule, book);
        Ok(self
            .state
            .with_range_source(|source| cluster_readings(book, &occurrences, source)))
    }
}

/// Background replay: drains right after an offline to online transition
/// and otherwise every `replay_interval`. Halted drains count as failures
/// for the circuit breaker and back off with jitter.
pub fn spawn_replay_loop(engine: Arc<SyncEngine>, config: &SyncConfig) -> JoinHandle<()> {
    let poll = config.connectivity_poll();
    let interval = config.replay_interval();
    let breaker = CircuitBreaker::new(
        Duration::from_secs(config.breaker_timeout_secs),
        config.breaker_failure_threshold,
    );

    tokio::spawn(async move {
        let backoff = ExponentialBackoff::default();
        let mut was_online = engine.is_online();
        let mut last_attempt: Option<Instant> = None;
        let mut attempt: u32 = 0;

        loop {
            tokio::time::sleep(poll).await;

            let online = engine.is_online();
            let reconnected = online && !was_online;
            was_online = online;
            if !online {
                continue;
            }

            let due = reconnected || last_attempt.map_or(true, |t| t.elapsed() >= interval);
            if !due || breaker.is_open() {
                continue;
            }
            last_attempt = Some(Instant::now());

            let failed = match engine.replay_pending().await {
                Ok(report) => report.is_halted(),
                Err(e) => {
                    tracing::warn!(error = %e, "Offline replay failed");
                    true
                }
            };

            if failed {
                breaker.record_failure();
                let delay = backoff.delay_with_jitter(attempt);
                attempt = attempt.saturating_add(1);
                tracing::debug!(delay_ms = delay.as_millis() as u64, attempt = attempt, "Backing off replay");
                tokio::time::sleep(delay).await;
            } else {
                breaker.record_success();
                attempt = 0;
            }
        }
    })
}
