use serde::{Deserialize, Serialize};
use crate::progress::record::CompletionRecord;

/// A single change to one reading item, as sent to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingMutation {
    pub plan_id: String,
    pub day: u32,
    pub reading_index: usize,
    pub completed: bool,
    pub chapter_count: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_chapters: Option<Vec<String>>,
}

/// Whole-day completion change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayMutation {
    pub plan_id: String,
    pub day: u32,
    pub completed: bool,
    /// Items scheduled that day; needed to apply the change locally
    #[serde(default)]
    pub total_items: usize,
}

/// What the toggle controller asks the sync engine to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MutationIntent {
    Reading(ReadingMutation),
    Day(DayMutation),
}

impl MutationIntent {
    pub fn plan_id(&self) -> &str {
        match self {
            MutationIntent::Reading(m) => &m.plan_id,
            MutationIntent::Day(m) => &m.plan_id,
        }
    }

    pub fn day(&self) -> u32 {
        match self {
            MutationIntent::Reading(m) => m.day,
            MutationIntent::Day(m) => m.day,
        }
    }

    pub fn completed(&self) -> bool {
        match self {
            MutationIntent::Reading(m) => m.completed,
            MutationIntent::Day(m) => m.completed,
        }
    }

    /// Apply the change to a local record. `total_items` is the number of
    /// items scheduled on the intent's day when the schedule is known.
    pub fn apply_to(&self, record: &mut CompletionRecord, total_items: Option<usize>) {
        match self {
            MutationIntent::Reading(m) => record.apply_reading(
                m.day,
                m.reading_index,
                m.completed,
                m.completed_chapters.as_deref(),
                total_items,
            ),
            MutationIntent::Day(m) => {
                record.apply_day(m.day, m.completed, total_items.unwrap_or(m.total_items))
            }
        }
    }
}
