use std::path::{Path, PathBuf};
use std::sync::Arc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use crate::config::settings::SyncConfig;
use crate::error::ProgressError;
use crate::offline::{JsonFileStore, OfflineQueue};
use crate::progress::cluster::{pass_counts, pass_fraction};
use crate::progress::record::CompletionRecord;
use crate::schedule::{load_schedule, ScheduleEntry, VerseTable};
use crate::state::app::AppState;
use crate::sync::{ConnectivityFlag, HttpProgressStore, SyncEngine};

#[derive(Parser, Debug)]
#[command(name = "readplan")]
#[command(about = "Reading-plan progress accounting with offline-capable sync")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chapter and day totals for a schedule and a local progress file
    Totals {
        #[arg(long)]
        schedule: PathBuf,
        #[arg(long)]
        progress: Option<PathBuf>,
        #[arg(long)]
        up_to_day: Option<u32>,
    },
    /// Reading passes of one book
    Passes {
        #[arg(long)]
        schedule: PathBuf,
        #[arg(long)]
        book: String,
        #[arg(long)]
        progress: Option<PathBuf>,
    },
    /// Advance one chapter's completion cycle on the server
    Toggle {
        #[arg(long, env = "READPLAN_USER")]
        user: String,
        #[arg(long)]
        plan: String,
        #[arg(long)]
        schedule: PathBuf,
        #[arg(long)]
        book: String,
        #[arg(long)]
        chapter: String,
        /// Skip the network and queue the change
        #[arg(long)]
        offline: bool,
    },
    /// Flip a whole day on the server
    ToggleDay {
        #[arg(long, env = "READPLAN_USER")]
        user: String,
        #[arg(long)]
        plan: String,
        #[arg(long)]
        schedule: PathBuf,
        #[arg(long)]
        day: u32,
        #[arg(long)]
        offline: bool,
    },
    /// Send the user's queued offline actions
    Replay {
        #[arg(long, env = "READPLAN_USER")]
        user: String,
    },
    /// List the user's queued offline actions
    Pending {
        #[arg(long, env = "READPLAN_USER")]
        user: String,
    },
    /// Discard the user's queued offline actions
    SignOut {
        #[arg(long, env = "READPLAN_USER")]
        user: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PassRow {
    chapter: u32,
    pass: usize,
    passes_of_chapter: usize,
    readings: usize,
    fraction: f64,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ProgressError> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

async fn load_progress(path: Option<&Path>, schedule: &[ScheduleEntry]) -> Result<CompletionRecord, ProgressError> {
    let Some(path) = path else {
        return Ok(CompletionRecord::new());
    };
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProgressError::from(e).with_context(format!("path: {:?}", path)))?;
    let mut record: CompletionRecord = serde_json::from_str(&content)
        .map_err(|e| ProgressError::from(e).with_context(format!("path: {:?}", path)))?;
    record.normalize(schedule);
    Ok(record)
}

async fn load_state(config: &SyncConfig) -> Result<AppState, ProgressError> {
    let state = AppState::with_cache_capacity(config.range_cache_capacity);
    if let Some(path) = &config.verse_counts_path {
        state.set_verse_table(VerseTable::load(path).await?);
    }
    Ok(state)
}

async fn build_engine(config: &SyncConfig, user: &str, online: bool) -> Result<SyncEngine, ProgressError> {
    let state = load_state(config).await?;
    let remote = Arc::new(HttpProgressStore::from_config(config)?);
    let store = Arc::new(JsonFileStore::in_dir(&config.resolved_data_dir()));
    let engine = SyncEngine::new(
        state,
        remote,
        Arc::new(ConnectivityFlag::new(online)),
        OfflineQueue::new(store),
        config.toggle_cooldown(),
    );
    engine.sign_in(user).await?;
    Ok(engine)
}

/// Load the schedule, register it and pull the server record when online.
/// An unreachable server is not fatal; the command then works from the
/// queued actions of earlier runs.
async fn prepare_plan(engine: &SyncEngine, plan: &str, schedule: &Path) -> Result<(), ProgressError> {
    engine.register_plan(plan, load_schedule(schedule).await?);
    if !engine.is_online() {
        engine.load_pending(plan).await;
        return Ok(());
    }
    match engine.refresh(plan).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_offline_like() => {
            tracing::warn!(error = %e, plan_id = plan, "Server unreachable, continuing offline");
            engine.load_pending(plan).await;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

pub async fn execute(cli: Cli, config: &SyncConfig) -> Result<(), ProgressError> {
    match cli.command {
        Command::Totals { schedule, progress, up_to_day } => {
            let schedule = load_schedule(&schedule).await?;
            let record = load_progress(progress.as_deref(), &schedule).await?;
            print_json(&crate::progress::plan_summary(&schedule, &record, up_to_day))
        }
        Command::Passes { schedule, book, progress } => {
            let schedule = load_schedule(&schedule).await?;
            let record = load_progress(progress.as_deref(), &schedule).await?;
            let state = load_state(config).await?;
            let occurrences = crate::progress::book_occurrences(&schedule, &book);
            let instances = state.with_range_source(|source| {
                crate::progress::cluster_readings(&book, &occurrences, source)
            });
            let counts = pass_counts(&instances);
            let rows: Vec<PassRow> = instances
                .iter()
                .map(|instance| PassRow {
                    chapter: instance.chapter,
                    pass: instance.pass,
                    passes_of_chapter: counts.get(&instance.chapter).copied().unwrap_or(0),
                    readings: instance.refs.len(),
                    fraction: pass_fraction(instance, &record),
                })
                .collect();
            print_json(&rows)
        }
        Command::Toggle { user, plan, schedule, book, chapter, offline } => {
            let engine = build_engine(config, &user, !offline).await?;
            prepare_plan(&engine, &plan, &schedule).await?;
            let outcomes = engine.toggle_chapter(&plan, &book, &chapter).await?;
            let status = engine.chapter_status(&plan, &book, &chapter)?;
            print_json(&serde_json::json!({ "outcomes": outcomes, "status": status }))
        }
        Command::ToggleDay { user, plan, schedule, day, offline } => {
            let engine = build_engine(config, &user, !offline).await?;
            prepare_plan(&engine, &plan, &schedule).await?;
            let outcome = engine.toggle_day(&plan, day).await?;
            let days = engine.day_statuses(&plan)?;
            let status = days.iter().find(|d| d.day == day);
            print_json(&serde_json::json!({ "outcome": outcome, "day": status }))
        }
        Command::Replay { user } => {
            let engine = build_engine(config, &user, true).await?;
            let report = engine.replay_pending().await?;
            print_json(&serde_json::json!({
                "replayed": report.replayed,
                "remaining": report.remaining,
                "haltedOn": report.halted_on.as_ref().map(|e| e.to_string()),
            }))
        }
        Command::Pending { user } => {
            let queue = OfflineQueue::new(Arc::new(JsonFileStore::in_dir(&config.resolved_data_dir())));
            print_json(&queue.pending(&user).await?)
        }
        Command::SignOut { user } => {
            let engine = build_engine(config, &user, false).await?;
            let purged = engine.sign_out().await?;
            print_json(&serde_json::json!({ "purged": purged }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_toggle_command() {
        let cli = Cli::try_parse_from([
            "readplan", "toggle", "--user", "u1", "--plan", "p1", "--schedule", "s.json",
            "--book", "창세기", "--chapter", "3", "--offline",
        ])
        .unwrap();
        match cli.command {
            Command::Toggle { user, chapter, offline, .. } => {
                assert_eq!(user, "u1");
                assert_eq!(chapter, "3");
                assert!(offline);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_totals_day_cap_is_optional() {
        let cli = Cli::try_parse_from(["readplan", "totals", "--schedule", "s.json"]).unwrap();
        assert!(matches!(cli.command, Command::Totals { up_to_day: None, progress: None, .. }));
    }
}
