use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sync outcome counters.
/// All metrics are atomic counters for thread-safety
#[derive(Clone, Default)]
pub struct Metrics {
    /// Mutation intents issued (one per sequence number)
    pub mutations_issued: Arc<AtomicU64>,
    /// Server responses applied to the cache
    pub responses_applied: Arc<AtomicU64>,
    /// Responses dropped by the sequence guard
    pub stale_discarded: Arc<AtomicU64>,
    /// Optimistic states rolled back after a rejection
    pub rollbacks: Arc<AtomicU64>,
    /// Intents routed to the offline queue
    pub queued_offline: Arc<AtomicU64>,
    /// Queued actions successfully replayed
    pub replayed: Arc<AtomicU64>,
    /// Refresh results dropped because a newer mutation was issued
    pub cancelled_queries: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub mutations_issued: u64,
    pub responses_applied: u64,
    pub stale_discarded: u64,
    pub rollbacks: u64,
    pub queued_offline: u64,
    pub replayed: u64,
    pub cancelled_queries: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_issued(&self) {
        self.mutations_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_applied(&self) {
        self.responses_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.queued_offline.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replayed(&self, count: u64) {
        self.replayed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_cancelled_query(&self) {
        self.cancelled_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            mutations_issued: self.mutations_issued.load(Ordering::Relaxed),
            responses_applied: self.responses_applied.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            queued_offline: self.queued_offline.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            cancelled_queries: self.cancelled_queries.load(Ordering::Relaxed),
        }
    }
}
