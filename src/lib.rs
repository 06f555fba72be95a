pub mod cache;
pub mod circuit_breaker;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod offline;
pub mod parsing;
pub mod progress;
pub mod schedule;
pub mod state;
pub mod sync;

pub use error::{ErrorKind, ProgressError};
pub use offline::{JsonFileStore, KvStore, MemoryStore, OfflineAction, OfflineQueue, ReplayReport};
pub use progress::{
    cluster_readings, compute_chapters_totals, toggle_chapter, ChapterInstance, ChapterOccurrence,
    ChapterTotals, CompletionRecord, MutationIntent,
};
pub use schedule::{ReadingItem, ScheduleEntry, VerseTable};
pub use state::app::AppState;
pub use sync::{Connectivity, ConnectivityFlag, HttpProgressStore, ProgressStore, SyncEngine, SyncOutcome};

use clap::Parser;

pub fn run() {
    // Initialize structured logging first
    if let Err(e) = logging::try_init_logging() {
        eprintln!("Logging already initialized: {}", e);
    }

    let cli = cli::Cli::parse();
    let config = config::settings::get_sync_config();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create async runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(cli::execute(cli, config)) {
        tracing::error!(error = %e, "Command failed");
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
