//! Helpers for building maps from plain text.

use crate::builder::SourceMapBuilder;
use crate::types::SourceMap;

/// Byte-offset to line/column index over a text.
///
/// Columns are counted in chars, which is what every stage in the pipeline
/// uses when emitting mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    /// Byte offset of the first character of each line
    line_starts: Vec<usize>,
    total_length: usize,
}

impl LineIndex {
    pub fn new(content: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            content
                .char_indices()
                .filter_map(|(idx, ch)| (ch == '\n').then_some(idx + 1)),
        );
        Self {
            line_starts,
            total_length: content.len(),
        }
    }

    /// Number of lines (a trailing newline opens an empty last line).
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset where `line` starts.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }

    /// Convert a byte offset into a zero-based (line, column) pair.
    ///
    /// Returns None if the offset is out of bounds.
    pub fn line_col(&self, content: &str, offset: usize) -> Option<(u32, u32)> {
        if offset > self.total_length || !content.is_char_boundary(offset) {
            return None;
        }
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let start = self.line_starts[line];
        let column = content[start..offset].chars().count();
        Some((line as u32, column as u32))
    }
}

/// Map every line of `content` to the same line of `source`.
///
/// Used when a stage copies its input through unchanged, and for the
/// first phase when the output is a straight concatenation of one file.
pub fn identity_map(file: &str, source: &str, content: &str) -> SourceMap {
    let mut builder = SourceMapBuilder::new(file);
    let src = builder.add_source(source, None);
    let index = LineIndex::new(content);
    for line in 0..index.line_count() as u32 {
        builder.map_to(line, 0, src, line, 0);
    }
    builder.build()
}
