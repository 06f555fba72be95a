pub mod aggregate;
pub mod cluster;
pub mod intent;
pub mod record;
pub mod toggle;

pub use aggregate::{
    book_occurrences, build_requirements, chapter_status, compute_chapters_totals, day_statuses,
    occurrences_for, plan_summary, ChapterRequirement, ChapterStatus, ChapterTotals, DayStatus,
    Occurrence, PlanSummary,
};
pub use cluster::{cluster_readings, pass_counts, pass_fraction, ChapterInstance, ReadingOccurrence, ReadingRef};
pub use intent::{DayMutation, MutationIntent, ReadingMutation};
pub use record::CompletionRecord;
pub use toggle::{toggle_chapter, toggle_day, ChapterOccurrence, RecordLookup, ToggleController};
