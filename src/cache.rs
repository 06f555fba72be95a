use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use lru::LruCache;
use parking_lot::RwLock;
use crate::parsing::{parse_chapter_ranges, ChapterRange, RangeSource};
use crate::schedule::VerseTable;

#[derive(Clone, Debug)]
struct CachedRanges {
    book: String,
    chapter_spec: String,
    ranges: Vec<ChapterRange>,
}

/// Bounded memo of parsed ranges, keyed by book and chapter text.
/// Entries depend on the verse table they were parsed with; call `clear`
/// whenever the table is replaced.
pub struct RangeCache {
    entries: RwLock<LruCache<u64, CachedRanges>>,
}

/// Generate a hash key from book name and chapter text
fn cache_key(book: &str, chapter_spec: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    book.hash(&mut hasher);
    chapter_spec.hash(&mut hasher);
    hasher.finish()
}

impl RangeCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        RangeCache {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Check cache and return if found
    pub fn get_cached(&self, book: &str, chapter_spec: &str) -> Option<Vec<ChapterRange>> {
        let key = cache_key(book, chapter_spec);
        let cache = self.entries.read();
        match cache.peek(&key) {
            Some(hit) if hit.book == book && hit.chapter_spec == chapter_spec => {
                tracing::trace!(book = book, chapter_spec = chapter_spec, "Range cache hit");
                Some(hit.ranges.clone())
            }
            _ => None,
        }
    }

    /// Store parsed ranges in cache
    pub fn cache_ranges(&self, book: &str, chapter_spec: &str, ranges: &[ChapterRange]) {
        let key = cache_key(book, chapter_spec);
        let cached = CachedRanges {
            book: book.to_string(),
            chapter_spec: chapter_spec.to_string(),
            ranges: ranges.to_vec(),
        };
        self.entries.write().put(key, cached);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Range source that parses through a `RangeCache`
pub struct CachedRangeSource<'a> {
    pub cache: &'a RangeCache,
    pub verses: &'a VerseTable,
}

impl RangeSource for CachedRangeSource<'_> {
    fn ranges(&self, book: &str, chapter_spec: &str) -> Vec<ChapterRange> {
        if let Some(hit) = self.cache.get_cached(book, chapter_spec) {
            return hit;
        }
        let ranges = parse_chapter_ranges(book, chapter_spec, self.verses);
        self.cache.cache_ranges(book, chapter_spec, &ranges);
        ranges
    }

    fn verse_count(&self, book: &str, chapter: u32) -> Option<u32> {
        self.verses.verse_count(book, chapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_fills_cache_once() {
        let cache = RangeCache::new(4);
        let verses = VerseTable::new().with_book("룻기", vec![22, 23, 18, 22]);
        let source = CachedRangeSource { cache: &cache, verses: &verses };

        let first = source.ranges("룻기", "1-2장");
        assert_eq!(cache.len(), 1);
        let second = source.ranges("룻기", "1-2장");
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = RangeCache::new(2);
        cache.cache_ranges("a", "1", &[]);
        cache.cache_ranges("b", "1", &[]);
        cache.cache_ranges("c", "1", &[]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get_cached("a", "1").is_none());
    }

    #[test]
    fn test_zero_capacity_still_works() {
        let cache = RangeCache::new(0);
        cache.cache_ranges("a", "1", &[ChapterRange::whole(1, None)]);
        assert_eq!(cache.get_cached("a", "1"), Some(vec![ChapterRange::whole(1, None)]));
    }
}
