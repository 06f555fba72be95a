use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn build_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize structured logging with tracing.
/// Call once at startup; a second call reports the installed subscriber.
pub fn try_init_logging() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = tracing_subscriber::registry()
        .with(build_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json() // JSON output for structured logging
        );

    tracing::subscriber::set_global_default(subscriber)?;
    tracing::info!("Structured logging initialized");
    Ok(())
}

/// Log how a single mutation intent was resolved
pub fn log_mutation_outcome(plan_id: &str, seq: u64, outcome: &str, latency_ms: Option<u64>) {
    if let Some(latency) = latency_ms {
        tracing::info!(
            plan_id = plan_id,
            seq = seq,
            outcome = outcome,
            latency_ms = latency,
            "Mutation resolved"
        );
    } else {
        tracing::info!(plan_id = plan_id, seq = seq, outcome = outcome, "Mutation resolved");
    }
}

/// Log the result of an offline queue drain
pub fn log_replay(user_id: &str, replayed: usize, remaining: usize, halted: bool) {
    if halted {
        tracing::warn!(
            user_id = user_id,
            replayed = replayed,
            remaining = remaining,
            "Offline replay halted"
        );
    } else {
        tracing::info!(
            user_id = user_id,
            replayed = replayed,
            remaining = remaining,
            "Offline replay finished"
        );
    }
}
