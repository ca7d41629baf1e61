//! Source location tracking for error reporting and tooling queries.
//!
//! # Design
//!
//! - `Span` — compact byte range into a named source unit
//! - `SourceMap` — owns all source units of a compilation and provides lookups
//! - `SourceFile` — a single named text buffer with line indexing
//!
//! Source units are named buffers, not filesystem paths: the core performs no
//! I/O, so the host decides what a name means.

use serde::{Deserialize, Serialize};

/// Index into [`SourceMap`] identifying a source unit.
pub type FileId = u16;

/// Compact source location reference.
///
/// Points to a half-open byte range `[start, end)` in a source unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Index into `SourceMap` files
    pub file: FileId,
    /// Byte offset of start position
    pub start: u32,
    /// Byte offset of end position (exclusive)
    pub end: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Self { file, start, end }
    }

    /// Create a zero-length span at the start of a file.
    pub fn zero(file: FileId) -> Self {
        Self::new(file, 0, 0)
    }

    /// Check if this span is zero-length.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Get the length of this span in bytes.
    pub fn len(&self) -> u32 {
        debug_assert!(self.end >= self.start, "malformed span");
        self.end - self.start
    }

    /// Merge two spans into one covering both.
    ///
    /// Panics if the spans are from different files.
    pub fn merge(&self, other: &Span) -> Span {
        assert_eq!(
            self.file, other.file,
            "cannot merge spans from different files"
        );
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Check whether a byte offset falls inside this span (end-inclusive,
    /// so a cursor sitting just after an identifier still hits it).
    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset <= self.end
    }
}

/// Collection of all source units in a compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

/// A single source unit with line indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// The unit's name (usually its import path)
    pub name: String,
    /// Original source text
    pub source: String,
    /// Byte offsets of each line start; `line_starts[0]` is always 0 and the
    /// final entry is an EOF sentinel
    pub line_starts: Vec<u32>,
}

impl SourceMap {
    /// Create an empty source map.
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Add a source unit and return its ID.
    pub fn add_file(&mut self, name: impl Into<String>, source: impl Into<String>) -> FileId {
        let file = self.files.len();
        assert!(file < FileId::MAX as usize, "too many source files");

        let source = source.into();
        let line_starts = compute_line_starts(&source);
        self.files.push(SourceFile {
            name: name.into(),
            source,
            line_starts,
        });

        file as FileId
    }

    /// Get the source unit for a span.
    pub fn file(&self, span: &Span) -> &SourceFile {
        &self.files[span.file as usize]
    }

    /// Get a source unit by ID.
    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id as usize)
    }

    /// Look up a unit ID by name.
    pub fn find(&self, name: &str) -> Option<FileId> {
        self.files
            .iter()
            .position(|f| f.name == name)
            .map(|i| i as FileId)
    }

    /// Get the source snippet for a span.
    pub fn snippet(&self, span: &Span) -> &str {
        let file = &self.files[span.file as usize];
        &file.source[span.start as usize..span.end as usize]
    }

    /// Get the 1-based (line, column) position for a span's start.
    pub fn line_col(&self, span: &Span) -> (u32, u32) {
        self.files[span.file as usize].line_col(span.start)
    }

    /// Number of units in this map.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl SourceFile {
    /// Create a new source unit with precomputed line starts.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = compute_line_starts(&source);
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Get 1-based (line, column) for a byte offset.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let offset = offset.min(self.source.len() as u32);
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx.max(1) - 1,
        };
        let line = (line_idx + 1) as u32;
        let col = (offset - self.line_starts[line_idx]) + 1;
        (line, col)
    }

    /// Get the text of a specific 1-based line.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        if line == 0 || line as usize >= self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[(line - 1) as usize] as usize;
        let end = self.line_starts[line as usize] as usize;
        Some(&self.source[start..end])
    }
}

/// Compute byte offsets of line starts in source text.
fn compute_line_starts(source: &str) -> Vec<u32> {
    let mut line_starts = vec![0];
    for (idx, ch) in source.char_indices() {
        if ch == '\n' {
            line_starts.push((idx + 1) as u32);
        }
    }
    if line_starts.last() != Some(&(source.len() as u32)) {
        line_starts.push(source.len() as u32);
    }
    line_starts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let a = Span::new(0, 10, 20);
        let b = Span::new(0, 15, 30);
        let merged = a.merge(&b);
        assert_eq!(merged.start, 10);
        assert_eq!(merged.end, 30);
    }

    #[test]
    fn test_span_contains() {
        let span = Span::new(0, 4, 8);
        assert!(!span.contains(3));
        assert!(span.contains(4));
        assert!(span.contains(8));
        assert!(!span.contains(9));
    }

    #[test]
    fn test_line_col() {
        let file = SourceFile::new("test.fm", "hello\nworld\n");
        assert_eq!(file.line_col(0), (1, 1));
        assert_eq!(file.line_col(6), (2, 1));
        assert_eq!(file.line_col(11), (2, 6));
    }

    #[test]
    fn test_snippet_and_lookup() {
        let mut map = SourceMap::new();
        let id = map.add_file("test.fm", "nutrient protein {}");
        assert_eq!(map.find("test.fm"), Some(id));
        let span = Span::new(id, 9, 16);
        assert_eq!(map.snippet(&span), "protein");
        assert_eq!(map.line_col(&span), (1, 10));
    }

    #[test]
    fn test_line_text() {
        let file = SourceFile::new("test.fm", "hello\nworld");
        assert_eq!(file.line_text(1), Some("hello\n"));
        assert_eq!(file.line_text(2), Some("world"));
        assert_eq!(file.line_text(3), None);
    }
}
