//! Incremental construction of a [`SourceMap`].

use crate::types::{OriginalPosition, Segment, SourceMap};

/// Collects sources and mappings, then produces a sorted [`SourceMap`].
#[derive(Debug, Clone, Default)]
pub struct SourceMapBuilder {
    map: SourceMap,
}

impl SourceMapBuilder {
    /// Start a map for the generated file `file`.
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            map: SourceMap::new(file),
        }
    }

    /// Register a source and return its index.
    ///
    /// Registering the same name twice returns the first index; content is
    /// only recorded if none was known yet.
    pub fn add_source(&mut self, name: &str, content: Option<&str>) -> u32 {
        if let Some(idx) = self.map.source_index(name) {
            let slot = &mut self.map.sources_content[idx as usize];
            if slot.is_none() {
                *slot = content.map(str::to_string);
            }
            return idx;
        }
        self.map.sources.push(name.to_string());
        self.map.sources_content.push(content.map(str::to_string));
        (self.map.sources.len() - 1) as u32
    }

    /// Register a symbol name and return its index.
    pub fn add_name(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.map.names.iter().position(|n| n == name) {
            return idx as u32;
        }
        self.map.names.push(name.to_string());
        (self.map.names.len() - 1) as u32
    }

    /// Add a mapping from a generated position to an original one.
    pub fn add_mapping(
        &mut self,
        generated_line: u32,
        generated_column: u32,
        original: Option<OriginalPosition>,
    ) {
        let line = generated_line as usize;
        if self.map.lines.len() <= line {
            self.map.lines.resize_with(line + 1, Vec::new);
        }
        self.map.lines[line].push(Segment {
            generated_column,
            original,
        });
    }

    /// Convenience for a mapping into a known source index.
    pub fn map_to(
        &mut self,
        generated_line: u32,
        generated_column: u32,
        source: u32,
        line: u32,
        column: u32,
    ) {
        self.add_mapping(
            generated_line,
            generated_column,
            Some(OriginalPosition {
                source,
                line,
                column,
                name: None,
            }),
        );
    }

    /// Ensure the map covers at least `count` generated lines.
    pub fn ensure_lines(&mut self, count: usize) {
        if self.map.lines.len() < count {
            self.map.lines.resize_with(count, Vec::new);
        }
    }

    /// Finish: sort each line and drop exact duplicate segments.
    pub fn build(mut self) -> SourceMap {
        for line in &mut self.map.lines {
            line.sort_by_key(|s| s.generated_column);
            line.dedup_by(|b, a| a.generated_column == b.generated_column);
        }
        self.map
    }
}
