use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::parsing::{ChapterRange, RangeSource};
use crate::progress::record::CompletionRecord;

/// One scheduled reading of a book, in schedule order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingOccurrence {
    pub day: u32,
    pub reading_index: usize,
    pub chapter_spec: String,
}

impl ReadingOccurrence {
    pub fn new<S: Into<String>>(day: u32, reading_index: usize, chapter_spec: S) -> Self {
        ReadingOccurrence { day, reading_index, chapter_spec: chapter_spec.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingRef {
    pub day: u32,
    pub reading_index: usize,
    /// Share of the pass this reading covers, in (0, 1]
    pub weight: f64,
}

/// One read-through of a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterInstance {
    pub chapter: u32,
    /// 1-based pass number within the chapter
    pub pass: usize,
    pub refs: Vec<ReadingRef>,
}

struct PassMember {
    day: u32,
    reading_index: usize,
    ranges: Vec<ChapterRange>,
}

#[derive(Default)]
struct OpenPass {
    coverage: Vec<ChapterRange>,
    members: Vec<PassMember>,
}

impl OpenPass {
    fn overlaps(&self, ranges: &[ChapterRange]) -> bool {
        ranges
            .iter()
            .any(|r| self.coverage.iter().any(|c| c.overlaps(r)))
    }

    fn extend(&mut self, member: PassMember) {
        self.coverage.extend(member.ranges.iter().copied());
        self.members.push(member);
    }
}

fn finalize(chapter: u32, pass: usize, open: OpenPass, verse_count: Option<u32>) -> ChapterInstance {
    let uniform = 1.0 / open.members.len() as f64;
    let refs = open
        .members
        .into_iter()
        .map(|member| {
            let weight = match verse_count {
                Some(total) => {
                    let covered: u32 = member.ranges.iter().map(|r| r.len_within(total)).sum();
                    if covered == 0 {
                        uniform
                    } else {
                        (covered as f64 / total as f64).min(1.0)
                    }
                }
                // Verse distribution unknown: split the pass evenly
                None => uniform,
            };
            ReadingRef { day: member.day, reading_index: member.reading_index, weight }
        })
        .collect();
    ChapterInstance { chapter, pass, refs }
}

/// Group the readings of one book into passes per chapter.
///
/// A reading that shares any verse with the current pass of a chapter starts
/// a new pass; a disjoint reading extends the current one. Output is ordered
/// by chapter, then pass.
pub fn cluster_readings<R>(book: &str, occurrences: &[ReadingOccurrence], source: &R) -> Vec<ChapterInstance>
where
    R: RangeSource + ?Sized,
{
    let mut open: BTreeMap<u32, OpenPass> = BTreeMap::new();
    let mut finished: BTreeMap<u32, Vec<ChapterInstance>> = BTreeMap::new();

    for occurrence in occurrences {
        let mut by_chapter: BTreeMap<u32, Vec<ChapterRange>> = BTreeMap::new();
        for range in source.ranges(book, &occurrence.chapter_spec) {
            by_chapter.entry(range.chapter).or_default().push(range);
        }

        for (chapter, ranges) in by_chapter {
            let current = open.entry(chapter).or_default();
            let member = PassMember {
                day: occurrence.day,
                reading_index: occurrence.reading_index,
                ranges,
            };

            if !current.members.is_empty() && current.overlaps(&member.ranges) {
                let done = std::mem::take(current);
                let passes = finished.entry(chapter).or_default();
                let pass = passes.len() + 1;
                passes.push(finalize(chapter, pass, done, source.verse_count(book, chapter)));
            }
            current.extend(member);
        }
    }

    for (chapter, pass_state) in open {
        if pass_state.members.is_empty() {
            continue;
        }
        let passes = finished.entry(chapter).or_default();
        let pass = passes.len() + 1;
        passes.push(finalize(chapter, pass, pass_state, source.verse_count(book, chapter)));
    }

    finished.into_values().flatten().collect()
}

/// Number of passes per chapter ("read N times")
pub fn pass_counts(instances: &[ChapterInstance]) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for instance in instances {
        *counts.entry(instance.chapter).or_insert(0) += 1;
    }
    counts
}

/// Completed share of one pass against a record, capped at 1.0
pub fn pass_fraction(instance: &ChapterInstance, record: &CompletionRecord) -> f64 {
    let token = instance.chapter.to_string();
    let done: f64 = instance
        .refs
        .iter()
        .filter(|r| record.is_occurrence_satisfied(r.day, r.reading_index, &token))
        .map(|r| r.weight)
        .sum();
    done.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::VerseTable;

    fn table() -> VerseTable {
        // chapter 22 of this book has 32 verses
        let mut counts = vec![20; 21];
        counts.push(32);
        VerseTable::new().with_book("잠언", counts)
    }

    #[test]
    fn test_split_chapter_is_one_pass_and_overlap_starts_another() {
        let occurrences = vec![
            ReadingOccurrence::new(1, 0, "22:1-8"),
            ReadingOccurrence::new(2, 0, "22:9-16"),
            ReadingOccurrence::new(3, 0, "22:1-10"),
        ];
        let instances = cluster_readings("잠언", &occurrences, &VerseTable::new());

        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].pass, 1);
        assert_eq!(instances[0].refs.len(), 2);
        assert_eq!(instances[1].pass, 2);
        assert_eq!(instances[1].refs[0].day, 3);
        assert_eq!(pass_counts(&instances).get(&22), Some(&2));
    }

    #[test]
    fn test_unknown_verse_counts_weight_uniformly() {
        let occurrences = vec![
            ReadingOccurrence::new(1, 0, "22:1-8"),
            ReadingOccurrence::new(2, 0, "22:9-30"),
        ];
        let instances = cluster_readings("잠언", &occurrences, &VerseTable::new());
        assert_eq!(instances[0].refs[0].weight, 0.5);
        assert_eq!(instances[0].refs[1].weight, 0.5);
    }

    #[test]
    fn test_known_verse_counts_weight_by_length() {
        let occurrences = vec![
            ReadingOccurrence::new(1, 0, "22:1-8"),
            ReadingOccurrence::new(2, 0, "22:9-32"),
        ];
        let instances = cluster_readings("잠언", &occurrences, &table());
        assert_eq!(instances.len(), 1);
        assert!((instances[0].refs[0].weight - 0.25).abs() < 1e-9);
        assert!((instances[0].refs[1].weight - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_whole_chapter_reread_with_open_bound() {
        let occurrences = vec![
            ReadingOccurrence::new(1, 0, "5장"),
            ReadingOccurrence::new(8, 1, "5장"),
            ReadingOccurrence::new(9, 0, "6장"),
        ];
        let instances = cluster_readings("잠언", &occurrences, &VerseTable::new());
        let chapters: Vec<(u32, usize)> = instances.iter().map(|i| (i.chapter, i.pass)).collect();
        assert_eq!(chapters, vec![(5, 1), (5, 2), (6, 1)]);
        assert_eq!(instances[0].refs[0].weight, 1.0);
    }

    #[test]
    fn test_pass_fraction_sums_satisfied_weights() {
        let occurrences = vec![
            ReadingOccurrence::new(1, 0, "22:1-8"),
            ReadingOccurrence::new(2, 0, "22:9-32"),
        ];
        let instances = cluster_readings("잠언", &occurrences, &table());

        let mut record = CompletionRecord::new();
        record.apply_reading(2, 0, true, None, Some(1));
        assert!((pass_fraction(&instances[0], &record) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_unparseable_occurrences_are_ignored() {
        let occurrences = vec![ReadingOccurrence::new(1, 0, "서론")];
        assert!(cluster_readings("잠언", &occurrences, &VerseTable::new()).is_empty());
    }
}
