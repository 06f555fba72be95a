use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use crate::progress::cluster::ReadingOccurrence;
use crate::progress::record::CompletionRecord;
use crate::progress::toggle::ChapterOccurrence;
use crate::schedule::ScheduleEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterTotals {
    pub total_chapters: usize,
    pub completed_chapters: usize,
}

/// A `(day, readingIndex)` position in the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub day: u32,
    pub reading_index: usize,
}

/// Every place in the schedule that reads one chapter of one book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRequirement {
    pub book: String,
    pub token: String,
    pub occurrences: BTreeSet<Occurrence>,
}

impl ChapterRequirement {
    pub fn satisfied_count(&self, record: &CompletionRecord) -> usize {
        self.occurrences
            .iter()
            .filter(|o| record.is_occurrence_satisfied(o.day, o.reading_index, &self.token))
            .count()
    }

    /// Complete only when every occurrence is satisfied
    pub fn is_complete(&self, record: &CompletionRecord) -> bool {
        self.satisfied_count(record) == self.occurrences.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterStatus {
    pub done: usize,
    pub total: usize,
}

impl ChapterStatus {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.done == self.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStatus {
    pub day: u32,
    pub total_items: usize,
    pub completed_items: usize,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub chapters: ChapterTotals,
    pub total_days: usize,
    pub completed_days: usize,
    /// completed / total chapters, 0.0 for an empty plan
    pub ratio: f64,
}

fn entries_up_to(schedule: &[ScheduleEntry], up_to_day: Option<u32>) -> impl Iterator<Item = &ScheduleEntry> {
    schedule
        .iter()
        .filter(move |entry| up_to_day.map_or(true, |cap| entry.day <= cap))
}

/// Requirement sets keyed by `(book, token)`, built with the token expander
pub fn build_requirements(
    schedule: &[ScheduleEntry],
    up_to_day: Option<u32>,
) -> BTreeMap<(String, String), ChapterRequirement> {
    let mut requirements: BTreeMap<(String, String), ChapterRequirement> = BTreeMap::new();

    for entry in entries_up_to(schedule, up_to_day) {
        for (reading_index, item) in entry.readings.iter().enumerate() {
            let book = item.book.trim();
            for token in item.chapter_tokens() {
                requirements
                    .entry((book.to_string(), token.clone()))
                    .or_insert_with(|| ChapterRequirement {
                        book: book.to_string(),
                        token,
                        occurrences: BTreeSet::new(),
                    })
                    .occurrences
                    .insert(Occurrence { day: entry.day, reading_index });
            }
        }
    }
    requirements
}

/// Exact chapter totals for a plan, optionally capped at `up_to_day`
pub fn compute_chapters_totals(
    schedule: &[ScheduleEntry],
    record: &CompletionRecord,
    up_to_day: Option<u32>,
) -> ChapterTotals {
    let requirements = build_requirements(schedule, up_to_day);
    let completed_chapters = requirements
        .values()
        .filter(|req| req.is_complete(record))
        .count();
    ChapterTotals {
        total_chapters: requirements.len(),
        completed_chapters,
    }
}

pub fn chapter_status(
    schedule: &[ScheduleEntry],
    record: &CompletionRecord,
    book: &str,
    token: &str,
) -> ChapterStatus {
    let requirements = build_requirements(schedule, None);
    match requirements.get(&(book.trim().to_string(), token.to_string())) {
        Some(req) => ChapterStatus {
            done: req.satisfied_count(record),
            total: req.occurrences.len(),
        },
        None => ChapterStatus { done: 0, total: 0 },
    }
}

pub fn day_statuses(schedule: &[ScheduleEntry], record: &CompletionRecord) -> Vec<DayStatus> {
    let mut totals: BTreeMap<u32, usize> = BTreeMap::new();
    for entry in schedule {
        *totals.entry(entry.day).or_insert(0) += entry.readings.len();
    }
    totals
        .into_iter()
        .map(|(day, total_items)| {
            let completed_items = if record.is_day_complete(day) {
                total_items
            } else {
                record.completed_item_count(day).min(total_items)
            };
            DayStatus {
                day,
                total_items,
                completed_items,
                is_complete: total_items > 0 && completed_items >= total_items,
            }
        })
        .collect()
}

pub fn plan_summary(
    schedule: &[ScheduleEntry],
    record: &CompletionRecord,
    up_to_day: Option<u32>,
) -> PlanSummary {
    let chapters = compute_chapters_totals(schedule, record, up_to_day);
    let days: Vec<DayStatus> = day_statuses(schedule, record)
        .into_iter()
        .filter(|d| up_to_day.map_or(true, |cap| d.day <= cap))
        .collect();
    let ratio = if chapters.total_chapters == 0 {
        0.0
    } else {
        chapters.completed_chapters as f64 / chapters.total_chapters as f64
    };
    PlanSummary {
        chapters,
        total_days: days.len(),
        completed_days: days.iter().filter(|d| d.is_complete).count(),
        ratio,
    }
}

/// Toggle-ready occurrences of one chapter in a plan, in schedule order
pub fn occurrences_for(
    plan_id: &str,
    schedule: &[ScheduleEntry],
    book: &str,
    token: &str,
) -> Vec<ChapterOccurrence> {
    let book = book.trim();
    let mut out = Vec::new();
    for entry in schedule {
        for (reading_index, item) in entry.readings.iter().enumerate() {
            if item.book.trim() != book {
                continue;
            }
            let item_tokens = item.chapter_tokens();
            if !item_tokens.iter().any(|t| t == token) {
                continue;
            }
            out.push(ChapterOccurrence {
                plan_id: plan_id.to_string(),
                day: entry.day,
                reading_index,
                chapter_count: item.chapter_count(),
                item_tokens,
            });
        }
    }
    out.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    out
}

/// Every reading of `book`, in schedule order, as clustering input
pub fn book_occurrences(schedule: &[ScheduleEntry], book: &str) -> Vec<ReadingOccurrence> {
    let book = book.trim();
    let mut entries: Vec<&ScheduleEntry> = schedule.iter().collect();
    entries.sort_by_key(|entry| entry.day);

    entries
        .into_iter()
        .flat_map(|entry| {
            entry
                .readings
                .iter()
                .enumerate()
                .filter(move |(_, item)| item.book.trim() == book)
                .map(move |(idx, item)| ReadingOccurrence::new(entry.day, idx, item.chapter_spec.clone()))
        })
        .collect()
}
