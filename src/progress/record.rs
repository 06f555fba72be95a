use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use crate::schedule::{total_reading_items, ScheduleEntry};

/// Per user and plan completion state, mirrored from the remote store.
///
/// Wire shape (JSON):
/// `completedDays: number[]`,
/// `completedReadingsByDay: { "<day>": number[] }`,
/// `completedChaptersByDay: { "<day>": { "<readingIndex>": string[] } }`.
///
/// Invariants kept by every mutating method:
/// a reading index listed as complete has no partial chapter entry, and a day
/// is complete exactly when all of its scheduled items are complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    #[serde(default)]
    pub completed_days: BTreeSet<u32>,
    #[serde(default)]
    pub completed_readings_by_day: BTreeMap<u32, BTreeSet<usize>>,
    #[serde(default)]
    pub completed_chapters_by_day: BTreeMap<u32, BTreeMap<usize, BTreeSet<String>>>,
}

impl CompletionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_day_complete(&self, day: u32) -> bool {
        self.completed_days.contains(&day)
    }

    pub fn is_reading_complete(&self, day: u32, reading_index: usize) -> bool {
        self.completed_readings_by_day
            .get(&day)
            .map_or(false, |set| set.contains(&reading_index))
    }

    /// Partially completed chapter tokens of one reading item
    pub fn chapters_for(&self, day: u32, reading_index: usize) -> Option<&BTreeSet<String>> {
        self.completed_chapters_by_day
            .get(&day)
            .and_then(|by_idx| by_idx.get(&reading_index))
    }

    /// An occurrence counts as read through the day, the whole item, or the chapter itself
    pub fn is_occurrence_satisfied(&self, day: u32, reading_index: usize, token: &str) -> bool {
        self.is_day_complete(day)
            || self.is_reading_complete(day, reading_index)
            || self
                .chapters_for(day, reading_index)
                .map_or(false, |set| set.contains(token))
    }

    pub fn completed_item_count(&self, day: u32) -> usize {
        self.completed_readings_by_day.get(&day).map_or(0, |set| set.len())
    }

    /// Mark one reading item complete or incomplete.
    ///
    /// `chapters` is the partial chapter list to keep for an incomplete item.
    /// With `total_items` unknown, day membership can only be revoked.
    pub fn apply_reading(
        &mut self,
        day: u32,
        reading_index: usize,
        completed: bool,
        chapters: Option<&[String]>,
        total_items: Option<usize>,
    ) {
        if completed {
            self.completed_readings_by_day
                .entry(day)
                .or_default()
                .insert(reading_index);
            self.clear_chapters(day, reading_index);
        } else {
            if let Some(set) = self.completed_readings_by_day.get_mut(&day) {
                set.remove(&reading_index);
            }
            match chapters.filter(|c| !c.is_empty()) {
                Some(tokens) => {
                    self.completed_chapters_by_day
                        .entry(day)
                        .or_default()
                        .insert(reading_index, tokens.iter().cloned().collect());
                }
                None => self.clear_chapters(day, reading_index),
            }
        }

        match total_items {
            Some(total) => self.recompute_day(day, total),
            None if !completed => {
                self.completed_days.remove(&day);
            }
            None => {}
        }
        self.prune(day);
    }

    /// Mark a whole day complete (every item) or clear it
    pub fn apply_day(&mut self, day: u32, completed: bool, total_items: usize) {
        self.completed_chapters_by_day.remove(&day);
        if completed && total_items > 0 {
            self.completed_readings_by_day.insert(day, (0..total_items).collect());
            self.completed_days.insert(day);
        } else {
            self.completed_readings_by_day.remove(&day);
            self.completed_days.remove(&day);
        }
        self.prune(day);
    }

    /// Re-derive `day ∈ completedDays` from the completed item count
    pub fn recompute_day(&mut self, day: u32, total_items: usize) {
        if total_items > 0 && self.completed_item_count(day) >= total_items {
            self.completed_days.insert(day);
        } else {
            self.completed_days.remove(&day);
        }
    }

    /// Re-establish both invariants against a schedule. Used on records
    /// arriving from outside the engine.
    pub fn normalize(&mut self, schedule: &[ScheduleEntry]) {
        for (day, readings) in self.completed_readings_by_day.iter() {
            if let Some(by_idx) = self.completed_chapters_by_day.get_mut(day) {
                by_idx.retain(|idx, _| !readings.contains(idx));
            }
        }

        let mut days: BTreeSet<u32> = self.completed_days.clone();
        days.extend(self.completed_readings_by_day.keys().copied());
        days.extend(self.completed_chapters_by_day.keys().copied());
        for day in days {
            let total = total_reading_items(schedule, day);
            self.recompute_day(day, total);
            self.prune(day);
        }
    }

    fn clear_chapters(&mut self, day: u32, reading_index: usize) {
        if let Some(by_idx) = self.completed_chapters_by_day.get_mut(&day) {
            by_idx.remove(&reading_index);
        }
    }

    fn prune(&mut self, day: u32) {
        if self.completed_readings_by_day.get(&day).map_or(false, |s| s.is_empty()) {
            self.completed_readings_by_day.remove(&day);
        }
        if let Some(by_idx) = self.completed_chapters_by_day.get_mut(&day) {
            by_idx.retain(|_, tokens| !tokens.is_empty());
            if by_idx.is_empty() {
                self.completed_chapters_by_day.remove(&day);
            }
        }
    }
}
