use std::collections::HashMap;
use std::path::Path;
use crate::error::ProgressError;

/// Verse counts per chapter, keyed by book name.
///
/// Chapter `n` is stored at index `n - 1`. Books missing from the table
/// resolve every lookup to `None`, which callers treat as "unbounded".
#[derive(Debug, Clone, Default)]
pub struct VerseTable {
    books: HashMap<String, Vec<u32>>,
}

impl VerseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_book<S: Into<String>>(mut self, book: S, counts: Vec<u32>) -> Self {
        self.insert(book, counts);
        self
    }

    pub fn insert<S: Into<String>>(&mut self, book: S, counts: Vec<u32>) {
        self.books.insert(book.into().trim().to_string(), counts);
    }

    /// Number of verses in `chapter` of `book`, if known and non-zero
    pub fn verse_count(&self, book: &str, chapter: u32) -> Option<u32> {
        let counts = self.books.get(book.trim())?;
        let idx = (chapter as usize).checked_sub(1)?;
        counts.get(idx).copied().filter(|n| *n > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self, ProgressError> {
        let books: HashMap<String, Vec<u32>> = serde_json::from_str(json)?;
        let mut table = VerseTable::new();
        for (book, counts) in books {
            table.insert(book, counts);
        }
        Ok(table)
    }

    /// Load a table from disk; a missing file yields an empty table
    pub async fn load(path: &Path) -> Result<Self, ProgressError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::from_json(&content)
                .map_err(|e| e.with_context(format!("path: {:?}", path))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = ?path, "Verse count table not found, verse bounds stay open");
                Ok(VerseTable::new())
            }
            Err(e) => Err(ProgressError::from(e).with_context(format!("path: {:?}", path))),
        }
    }
}
