pub mod verses;

use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::ProgressError;
use crate::parsing::tokens::expand_chapter_tokens;

pub use verses::VerseTable;

/// One entry of a reading schedule: a day number and what to read on it.
/// Reading order is significant; the position of an item is its reading index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub day: u32,
    pub readings: Vec<ReadingItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingItem {
    pub book: String,
    pub chapter_spec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_count_hint: Option<f64>,
}

impl ReadingItem {
    pub fn new<B: Into<String>, S: Into<String>>(book: B, chapter_spec: S) -> Self {
        ReadingItem {
            book: book.into(),
            chapter_spec: chapter_spec.into(),
            chapter_count_hint: None,
        }
    }

    /// Chapter tokens this item touches, deduplicated, in text order
    pub fn chapter_tokens(&self) -> Vec<String> {
        expand_chapter_tokens(&self.chapter_spec)
    }

    /// Amount reported to the remote store as `chapterCount`
    pub fn chapter_count(&self) -> f64 {
        match self.chapter_count_hint {
            Some(hint) => hint,
            None => self.chapter_tokens().len() as f64,
        }
    }
}

/// Number of reading items scheduled on `day` (0 for an unscheduled day)
pub fn total_reading_items(schedule: &[ScheduleEntry], day: u32) -> usize {
    schedule
        .iter()
        .filter(|entry| entry.day == day)
        .map(|entry| entry.readings.len())
        .sum()
}

/// Load a schedule from a JSON array of entries
pub async fn load_schedule(path: &Path) -> Result<Vec<ScheduleEntry>, ProgressError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProgressError::storage(
            format!("Failed to read schedule: {}", e),
            "io"
        ).with_context(format!("path: {:?}", path)))?;

    let mut schedule: Vec<ScheduleEntry> = serde_json::from_str(&content)
        .map_err(|e| ProgressError::storage(
            format!("Failed to parse schedule: {}", e),
            "json_parse"
        ).with_context(format!("path: {:?}", path)))?;
    schedule.sort_by_key(|entry| entry.day);
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> Vec<ScheduleEntry> {
        vec![
            ScheduleEntry {
                day: 1,
                readings: vec![ReadingItem::new("창세기", "1-3장"), ReadingItem::new("마태복음", "1장")],
            },
            ScheduleEntry {
                day: 2,
                readings: vec![ReadingItem::new("창세기", "4장")],
            },
        ]
    }

    #[test]
    fn test_total_reading_items() {
        let schedule = schedule();
        assert_eq!(total_reading_items(&schedule, 1), 2);
        assert_eq!(total_reading_items(&schedule, 2), 1);
        assert_eq!(total_reading_items(&schedule, 9), 0);
    }

    #[test]
    fn test_chapter_count_prefers_hint() {
        let mut item = ReadingItem::new("창세기", "1-3장");
        assert_eq!(item.chapter_count(), 3.0);
        item.chapter_count_hint = Some(2.5);
        assert_eq!(item.chapter_count(), 2.5);
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let json = r#"[{"day":3,"readings":[{"book":"시편","chapterSpec":"23편","chapterCountHint":1.0}]}]"#;
        let parsed: Vec<ScheduleEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed[0].readings[0].chapter_spec, "23편");
        assert_eq!(parsed[0].readings[0].chapter_count_hint, Some(1.0));
        assert_eq!(parsed[0].readings[0].book, "시편");
    }
}
