use std::sync::atomic::{AtomicU64, AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use rand::Rng;

/// Circuit breaker guarding background replay against a failing server.
/// Implements a simple three-state circuit breaker pattern
#[derive(Clone)]
pub struct CircuitBreaker {
    /// Number of consecutive failures
    failures: Arc<AtomicU64>,
    /// Last failure time
    last_failure: Arc<RwLock<Option<Instant>>>,
    /// Circuit state (true = open/failed, false = closed/healthy)
    is_open: Arc<AtomicBool>,
    /// How long the circuit stays open before a trial call
    timeout: Duration,
    /// Failure threshold before opening circuit
    failure_threshold: u64,
}

impl CircuitBreaker {
    pub fn new(timeout: Duration, failure_threshold: u64) -> Self {
        CircuitBreaker {
            failures: Arc::new(AtomicU64::new(0)),
            last_failure: Arc::new(RwLock::new(None)),
            is_open: Arc::new(AtomicBool::new(false)),
            timeout,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Check if circuit is open (should not attempt call)
    pub fn is_open(&self) -> bool {
        if !self.is_open.load(Ordering::Relaxed) {
            return false;
        }

        // Half-open once the timeout has passed
        let last_failure = self.last_failure.read();
        if let Some(time) = *last_failure {
            if time.elapsed() >= self.timeout {
                self.is_open.store(false, Ordering::Relaxed);
                self.failures.store(0, Ordering::Relaxed);
                return false;
            }
        }
        true
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
        self.is_open.store(false, Ordering::Relaxed);
        *self.last_failure.write() = None;
    }

    pub fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_failure.write() = Some(Instant::now());

        if failures >= self.failure_threshold {
            if !self.is_open.swap(true, Ordering::Relaxed) {
                tracing::warn!(failures = failures, "Replay circuit opened");
            }
        }
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Exponential backoff calculator
pub struct ExponentialBackoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f64,
}

impl ExponentialBackoff {
    pub fn new(initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        ExponentialBackoff {
            initial_delay_ms,
            max_delay_ms,
            multiplier: 2.0,
        }
    }

    /// Calculate delay for attempt number (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let exponent = attempt.min(30) as i32;
        let delay = (self.initial_delay_ms as f64 * self.multiplier.powi(exponent)) as u64;
        delay.min(self.max_delay_ms)
    }

    /// Delay for `attempt`, spread uniformly over its upper half so that
    /// clients reconnecting together do not retry in lockstep
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let ceiling = self.delay_for_attempt(attempt);
        let floor = ceiling / 2;
        let ms = if ceiling > floor {
            rand::thread_rng().gen_range(floor..=ceiling)
        } else {
            ceiling
        };
        Duration::from_millis(ms)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(500, 60_000)
    }
}
