/// Performance timing utilities for measuring latency
use std::time::Instant;

/// Performance timer that logs once, on drop
pub struct PerfTimer {
    label: &'static str,
    context: Option<String>,
    start: Instant,
}

impl PerfTimer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            context: None,
            start: Instant::now(),
        }
    }

    /// Timer whose log line also names what was timed (a plan id, say)
    pub fn with_context(label: &'static str, context: impl Into<String>) -> Self {
        Self {
            label,
            context: Some(context.into()),
            start: Instant::now(),
        }
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        match &self.context {
            Some(context) => log_perf_with_context(self.label, self.elapsed_ms(), context),
            None => log_perf(self.label, self.elapsed_ms()),
        }
    }
}

pub fn log_perf(label: &str, duration_ms: u64) {
    tracing::debug!(label = label, duration_ms = duration_ms, "perf");
}

pub fn log_perf_with_context(label: &str, duration_ms: u64, context: &str) {
    tracing::debug!(label = label, duration_ms = duration_ms, context = context, "perf");
}
