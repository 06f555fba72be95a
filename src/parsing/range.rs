use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use crate::schedule::VerseTable;
use super::{capture_u32, normalize_punctuation, ordered_span};

/// A verse span inside one chapter. `end_verse == None` means the end of the
/// chapter is unknown, so the span runs to the end of the chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRange {
    pub chapter: u32,
    pub start_verse: u32,
    pub end_verse: Option<u32>,
}

impl ChapterRange {
    pub fn verses(chapter: u32, start_verse: u32, end_verse: u32) -> Self {
        let (start_verse, end_verse) = if start_verse <= end_verse {
            (start_verse, end_verse)
        } else {
            (end_verse, start_verse)
        };
        ChapterRange { chapter, start_verse: start_verse.max(1), end_verse: Some(end_verse.max(1)) }
    }

    pub fn whole(chapter: u32, verse_count: Option<u32>) -> Self {
        ChapterRange { chapter, start_verse: 1, end_verse: verse_count }
    }

    fn tail(chapter: u32, start_verse: u32, verse_count: Option<u32>) -> Self {
        let end_verse = verse_count.map(|n| n.max(start_verse));
        ChapterRange { chapter, start_verse: start_verse.max(1), end_verse }
    }

    /// True when both ranges name the same chapter and share at least one verse
    pub fn overlaps(&self, other: &ChapterRange) -> bool {
        if self.chapter != other.chapter {
            return false;
        }
        let self_end = self.end_verse.unwrap_or(u32::MAX);
        let other_end = other.end_verse.unwrap_or(u32::MAX);
        self.start_verse <= other_end && other.start_verse <= self_end
    }

    /// Number of verses covered, capped at the chapter length when it is known
    pub fn len_within(&self, verse_count: u32) -> u32 {
        let end = self.end_verse.unwrap_or(verse_count).min(verse_count);
        if end < self.start_verse {
            return 0;
        }
        end - self.start_verse + 1
    }
}

type VerseLookup<'a> = &'a dyn Fn(u32) -> Option<u32>;
type RuleFn = fn(&Captures<'_>, VerseLookup<'_>) -> Option<Vec<ChapterRange>>;

struct RangeRule {
    name: &'static str,
    pattern: Regex,
    build: RuleFn,
}

fn rule(name: &'static str, pattern: &str, build: RuleFn) -> RangeRule {
    RangeRule {
        name,
        pattern: Regex::new(pattern).expect("range rule pattern is valid"),
        build,
    }
}

lazy_static! {
    /// Ordered: the first matching rule wins.
    static ref RANGE_RULES: Vec<RangeRule> = vec![
        rule("cross_chapter", r"^(\d+)\s*:\s*(\d+)\s*절?\s*-\s*(\d+)\s*:\s*(\d+)\s*절?$", build_cross_chapter),
        rule("verse_span", r"^(\d+)\s*:\s*(\d+)\s*절?\s*-\s*(\d+)\s*절?$", build_verse_span),
        rule("single_verse", r"^(\d+)\s*:\s*(\d+)\s*절?$", build_single_verse),
        rule("ko_verse_span", r"^(\d+)\s*(?:장|편)\s*(\d+)\s*절?\s*-\s*(\d+)\s*절?$", build_verse_span),
        rule("ko_single_verse", r"^(\d+)\s*(?:장|편)\s*(\d+)\s*절?$", build_single_verse),
        rule("chapter_span", r"^(\d+)\s*-\s*(\d+)\s*(?:장|편)?$", build_chapter_span),
        rule("single_chapter", r"^(\d+)\s*(?:장|편)?$", build_single_chapter),
    ];
}

fn build_cross_chapter(caps: &Captures<'_>, lookup: VerseLookup<'_>) -> Option<Vec<ChapterRange>> {
    let first = capture_u32(caps, 1)?;
    let start_verse = capture_u32(caps, 2)?;
    let last = capture_u32(caps, 3)?;
    let end_verse = capture_u32(caps, 4)?;
    if last < first {
        return None;
    }
    if first == last {
        return Some(vec![ChapterRange::verses(first, start_verse, end_verse)]);
    }
    ordered_span(first, last)?;

    let mut out = vec![ChapterRange::tail(first, start_verse, lookup(first))];
    for chapter in (first + 1)..last {
        out.push(ChapterRange::whole(chapter, lookup(chapter)));
    }
    out.push(ChapterRange::verses(last, 1, end_verse));
    Some(out)
}

fn build_verse_span(caps: &Captures<'_>, _lookup: VerseLookup<'_>) -> Option<Vec<ChapterRange>> {
    let chapter = capture_u32(caps, 1)?;
    let start = capture_u32(caps, 2)?;
    let end = capture_u32(caps, 3)?;
    Some(vec![ChapterRange::verses(chapter, start, end)])
}

fn build_single_verse(caps: &Captures<'_>, _lookup: VerseLookup<'_>) -> Option<Vec<ChapterRange>> {
    let chapter = capture_u32(caps, 1)?;
    let verse = capture_u32(caps, 2)?;
    Some(vec![ChapterRange::verses(chapter, verse, verse)])
}

fn build_chapter_span(caps: &Captures<'_>, lookup: VerseLookup<'_>) -> Option<Vec<ChapterRange>> {
    let (start, end) = ordered_span(capture_u32(caps, 1)?, capture_u32(caps, 2)?)?;
    Some((start..=end).map(|c| ChapterRange::whole(c, lookup(c))).collect())
}

fn build_single_chapter(caps: &Captures<'_>, lookup: VerseLookup<'_>) -> Option<Vec<ChapterRange>> {
    let chapter = capture_u32(caps, 1)?;
    Some(vec![ChapterRange::whole(chapter, lookup(chapter))])
}

/// Name of the rule a single segment matches, if any
pub fn classify_segment(segment: &str) -> Option<&'static str> {
    let segment = normalize_punctuation(segment);
    let segment = segment.trim();
    RANGE_RULES
        .iter()
        .find(|r| r.pattern.is_match(segment))
        .map(|r| r.name)
}

fn parse_segment(segment: &str, lookup: VerseLookup<'_>) -> Option<Vec<ChapterRange>> {
    let rule = RANGE_RULES.iter().find(|r| r.pattern.is_match(segment))?;
    let caps = rule.pattern.captures(segment)?;
    (rule.build)(&caps, lookup)
}

/// Parse a reading item's chapter text into verse ranges.
///
/// Segments are comma separated. Segments matching no rule are dropped.
pub fn parse_chapter_ranges(book: &str, chapter_spec: &str, verses: &VerseTable) -> Vec<ChapterRange> {
    let lookup = |chapter: u32| verses.verse_count(book, chapter);
    let normalized = normalize_punctuation(chapter_spec);

    let mut out = Vec::new();
    for segment in normalized.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match parse_segment(segment, &lookup) {
            Some(ranges) => out.extend(ranges),
            None => {
                tracing::debug!(book = book, segment = segment, "Dropping unparseable range segment");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genesis() -> VerseTable {
        VerseTable::new().with_book("창세기", vec![31, 25, 24, 26])
    }

    #[test]
    fn test_each_rule_is_reachable() {
        assert_eq!(classify_segment("22:1-23:5"), Some("cross_chapter"));
        assert_eq!(classify_segment("22:1-8"), Some("verse_span"));
        assert_eq!(classify_segment("22:4"), Some("single_verse"));
        assert_eq!(classify_segment("1장 22-25절"), Some("ko_verse_span"));
        assert_eq!(classify_segment("1장 22절"), Some("ko_single_verse"));
        assert_eq!(classify_segment("1-3장"), Some("chapter_span"));
        assert_eq!(classify_segment("3"), Some("single_chapter"));
        assert_eq!(classify_segment("서론"), None);
    }

    #[test]
    fn test_verse_span() {
        let ranges = parse_chapter_ranges("창세기", "22:1-8", &VerseTable::new());
        assert_eq!(ranges, vec![ChapterRange::verses(22, 1, 8)]);
    }

    #[test]
    fn test_korean_verse_span_with_suffix() {
        let ranges = parse_chapter_ranges("창세기", "1장 22-25절", &VerseTable::new());
        assert_eq!(ranges, vec![ChapterRange::verses(1, 22, 25)]);
    }

    #[test]
    fn test_verse_suffix_after_each_number() {
        let table = VerseTable::new();
        assert_eq!(parse_chapter_ranges("잠언", "22:1-8절", &table), vec![ChapterRange::verses(22, 1, 8)]);
        assert_eq!(parse_chapter_ranges("창세기", "1장 22절-25절", &table), vec![ChapterRange::verses(1, 22, 25)]);
        assert_eq!(parse_chapter_ranges("창세기", "3:4절", &table), vec![ChapterRange::verses(3, 4, 4)]);
        assert_eq!(classify_segment("1장 22절-25절"), Some("ko_verse_span"));
    }

    #[test]
    fn test_whole_chapters_resolve_from_table() {
        let ranges = parse_chapter_ranges("창세기", "1-3장", &genesis());
        assert_eq!(
            ranges,
            vec![
                ChapterRange::whole(1, Some(31)),
                ChapterRange::whole(2, Some(25)),
                ChapterRange::whole(3, Some(24)),
            ]
        );
    }

    #[test]
    fn test_unknown_chapter_length_is_unbounded() {
        let ranges = parse_chapter_ranges("출애굽기", "5", &genesis());
        assert_eq!(ranges, vec![ChapterRange { chapter: 5, start_verse: 1, end_verse: None }]);
    }

    #[test]
    fn test_unparseable_segments_are_dropped() {
        let ranges = parse_chapter_ranges("창세기", "2, 읽기 안내, 3:1", &genesis());
        assert_eq!(ranges, vec![ChapterRange::whole(2, Some(25)), ChapterRange::verses(3, 1, 1)]);
    }

    #[test]
    fn test_cross_chapter_span() {
        let ranges = parse_chapter_ranges("창세기", "2:20-4:3", &genesis());
        assert_eq!(
            ranges,
            vec![
                ChapterRange { chapter: 2, start_verse: 20, end_verse: Some(25) },
                ChapterRange::whole(3, Some(24)),
                ChapterRange::verses(4, 1, 3),
            ]
        );
    }

    #[test]
    fn test_oversized_chapter_span_is_rejected() {
        assert!(parse_chapter_ranges("창세기", "1-5000", &VerseTable::new()).is_empty());
    }

    #[test]
    fn test_overlap_with_open_end() {
        let open = ChapterRange::whole(22, None);
        assert!(open.overlaps(&ChapterRange::verses(22, 40, 41)));
        assert!(!open.overlaps(&ChapterRange::verses(23, 1, 2)));
        assert!(!ChapterRange::verses(22, 1, 8).overlaps(&ChapterRange::verses(22, 9, 16)));
    }

    #[test]
    fn test_len_within_caps_at_chapter_length() {
        assert_eq!(ChapterRange::verses(1, 20, 40).len_within(31), 12);
        assert_eq!(ChapterRange::whole(1, None).len_within(31), 31);
    }
}
