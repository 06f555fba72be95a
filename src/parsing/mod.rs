//! Text parsing for reading items: verse-precise ranges and coarse chapter tokens.

pub mod range;
pub mod tokens;

use regex::Captures;
use crate::schedule::VerseTable;

pub use range::{parse_chapter_ranges, ChapterRange};
pub use tokens::expand_chapter_tokens;

/// Longest chapter span a single segment may name. Wider spans are treated
/// as unparseable rather than expanded.
pub(crate) const MAX_CHAPTER_SPAN: u32 = 200;

/// Source of parsed ranges and verse counts for the clustering engine.
pub trait RangeSource {
    fn ranges(&self, book: &str, chapter_spec: &str) -> Vec<ChapterRange>;
    fn verse_count(&self, book: &str, chapter: u32) -> Option<u32>;
}

impl RangeSource for VerseTable {
    fn ranges(&self, book: &str, chapter_spec: &str) -> Vec<ChapterRange> {
        parse_chapter_ranges(book, chapter_spec, self)
    }

    fn verse_count(&self, book: &str, chapter: u32) -> Option<u32> {
        VerseTable::verse_count(self, book, chapter)
    }
}

/// Full-width and dash variants seen in hand-typed plans, folded to ASCII
pub(crate) fn normalize_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '：' => ':',
            '，' => ',',
            '；' => ';',
            '~' | '～' | '–' | '—' | '－' => '-',
            other => other,
        })
        .collect()
}

pub(crate) fn capture_u32(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse::<u32>().ok()
}

/// Inclusive span with reversed bounds swapped; `None` for spans that are too wide
pub(crate) fn ordered_span(a: u32, b: u32) -> Option<(u32, u32)> {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if hi - lo >= MAX_CHAPTER_SPAN {
        return None;
    }
    Some((lo, hi))
}
