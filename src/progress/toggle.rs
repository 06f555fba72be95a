use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use crate::progress::intent::{DayMutation, MutationIntent, ReadingMutation};
use crate::progress::record::CompletionRecord;
use crate::schedule::{total_reading_items, ScheduleEntry};

/// One place a chapter is scheduled, with what the toggle needs to build
/// a mutation for the surrounding reading item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterOccurrence {
    pub plan_id: String,
    pub day: u32,
    pub reading_index: usize,
    pub chapter_count: f64,
    /// All chapter tokens of the reading item, in text order
    pub item_tokens: Vec<String>,
}

impl ChapterOccurrence {
    pub fn sort_key(&self) -> (&str, u32, usize) {
        (self.plan_id.as_str(), self.day, self.reading_index)
    }
}

/// Where the toggle reads current completion state from.
pub trait RecordLookup {
    fn record_for(&self, plan_id: &str) -> Option<&CompletionRecord>;
}

impl RecordLookup for CompletionRecord {
    fn record_for(&self, _plan_id: &str) -> Option<&CompletionRecord> {
        Some(self)
    }
}

impl RecordLookup for HashMap<String, CompletionRecord> {
    fn record_for(&self, plan_id: &str) -> Option<&CompletionRecord> {
        self.get(plan_id)
    }
}

fn is_satisfied<L: RecordLookup + ?Sized>(records: &L, occ: &ChapterOccurrence, token: &str) -> bool {
    records
        .record_for(&occ.plan_id)
        .map_or(false, |r| r.is_occurrence_satisfied(occ.day, occ.reading_index, token))
}

/// Keep item order for tokens the item knows about, then any strays
fn ordered_tokens(item_tokens: &[String], set: &BTreeSet<String>) -> Vec<String> {
    let mut out: Vec<String> = item_tokens.iter().filter(|t| set.contains(*t)).cloned().collect();
    out.extend(set.iter().filter(|t| !item_tokens.contains(*t)).cloned());
    out
}

fn reading_intent(occ: &ChapterOccurrence, completed: bool, chapters: Vec<String>) -> MutationIntent {
    MutationIntent::Reading(ReadingMutation {
        plan_id: occ.plan_id.clone(),
        day: occ.day,
        reading_index: occ.reading_index,
        completed,
        chapter_count: occ.chapter_count,
        completed_chapters: if chapters.is_empty() { None } else { Some(chapters) },
    })
}

fn mark_intent(record: Option<&CompletionRecord>, occ: &ChapterOccurrence, token: &str) -> MutationIntent {
    let mut chapters: BTreeSet<String> = record
        .and_then(|r| r.chapters_for(occ.day, occ.reading_index))
        .cloned()
        .unwrap_or_default();
    chapters.insert(token.to_string());

    if occ.item_tokens.iter().all(|t| chapters.contains(t)) {
        reading_intent(occ, true, Vec::new())
    } else {
        reading_intent(occ, false, ordered_tokens(&occ.item_tokens, &chapters))
    }
}

fn clear_intent(record: Option<&CompletionRecord>, occ: &ChapterOccurrence, token: &str) -> MutationIntent {
    let whole_item = record.map_or(false, |r| {
        r.is_day_complete(occ.day) || r.is_reading_complete(occ.day, occ.reading_index)
    });

    let mut remaining: BTreeSet<String> = if whole_item {
        occ.item_tokens.iter().cloned().collect()
    } else {
        record
            .and_then(|r| r.chapters_for(occ.day, occ.reading_index))
            .cloned()
            .unwrap_or_default()
    };
    remaining.remove(token);
    reading_intent(occ, false, ordered_tokens(&occ.item_tokens, &remaining))
}

/// Advance one chapter's completion cycle.
///
/// While not every occurrence is satisfied, exactly one more (the lowest
/// `(planId, day, readingIndex)`) is marked. Once all are satisfied, all of
/// them are cleared together.
pub fn toggle_chapter<L>(
    book: &str,
    token: &str,
    occurrences: &[ChapterOccurrence],
    records: &L,
) -> Vec<MutationIntent>
where
    L: RecordLookup + ?Sized,
{
    let mut ordered: Vec<&ChapterOccurrence> = occurrences.iter().collect();
    ordered.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let pending = ordered.iter().find(|occ| !is_satisfied(records, occ, token));
    match pending {
        Some(occ) => {
            tracing::debug!(book = book, token = token, day = occ.day, "Marking chapter occurrence");
            vec![mark_intent(records.record_for(&occ.plan_id), occ, token)]
        }
        None => {
            tracing::debug!(book = book, token = token, count = ordered.len(), "Clearing chapter cycle");
            ordered
                .iter()
                .map(|occ| clear_intent(records.record_for(&occ.plan_id), occ, token))
                .collect()
        }
    }
}

/// Flip a whole day. Returns `None` for a day with nothing scheduled.
pub fn toggle_day(
    plan_id: &str,
    schedule: &[ScheduleEntry],
    record: &CompletionRecord,
    day: u32,
) -> Option<MutationIntent> {
    let total_items = total_reading_items(schedule, day);
    if total_items == 0 {
        return None;
    }
    Some(MutationIntent::Day(DayMutation {
        plan_id: plan_id.to_string(),
        day,
        completed: !record.is_day_complete(day),
        total_items,
    }))
}

/// Chapter toggling with a per-chapter cooldown against double activations.
pub struct ToggleController {
    cooldown: Duration,
    last_activation: HashMap<(String, String), Instant>,
}

impl ToggleController {
    pub fn new(cooldown: Duration) -> Self {
        ToggleController {
            cooldown,
            last_activation: HashMap::new(),
        }
    }

    pub fn toggle<L>(
        &mut self,
        book: &str,
        token: &str,
        occurrences: &[ChapterOccurrence],
        records: &L,
    ) -> Vec<MutationIntent>
    where
        L: RecordLookup + ?Sized,
    {
        self.toggle_at(Instant::now(), book, token, occurrences, records)
    }

    /// Same as `toggle` with an explicit clock reading
    pub fn toggle_at<L>(
        &mut self,
        now: Instant,
        book: &str,
        token: &str,
        occurrences: &[ChapterOccurrence],
        records: &L,
    ) -> Vec<MutationIntent>
    where
        L: RecordLookup + ?Sized,
    {
        let key = (book.trim().to_string(), token.to_string());
        if let Some(last) = self.last_activation.get(&key) {
            if now.saturating_duration_since(*last) < self.cooldown {
                tracing::debug!(book = book, token = token, "Toggle suppressed by cooldown");
                return Vec::new();
            }
        }
        self.last_activation.insert(key, now);
        toggle_chapter(book, token, occurrences, records)
    }
}
