//! Chaining maps across transformation stages.
//!
//! A stage map describes `stage output -> stage input`; the stage input is
//! named after the generated file of the previous map. Composing replaces
//! every segment that points into the stage input with the position the
//! previous map gives for it, so the result maps straight to the earliest
//! known sources. Segments pointing at other sources (files a stage pulled
//! in itself) are carried over unchanged.

use std::collections::HashMap;

use crate::types::{OriginalPosition, Segment, SourceMap};

impl SourceMap {
    /// Compose `self` (applied last) with `previous` (applied first).
    ///
    /// `self`'s segments whose source equals `previous.file` are resolved
    /// through `previous`. If `self` has no segment pointing at that file
    /// (for example because the stage map names its input differently), all
    /// sources of `self` are kept and nothing is resolved.
    pub fn compose(&self, previous: &SourceMap) -> SourceMap {
        let input_name = previous.file.as_deref().unwrap_or_default();
        let input_index = self.source_index(input_name);

        let mut sources: Vec<String> = Vec::new();
        let mut sources_content: Vec<Option<String>> = Vec::new();
        let mut names: Vec<String> = Vec::new();
        let mut source_remap: HashMap<(bool, u32), u32> = HashMap::new();
        let mut name_remap: HashMap<(bool, u32), u32> = HashMap::new();

        // `from_previous` selects which map the index belongs to.
        let mut intern_source = |from_previous: bool, index: u32| -> u32 {
            *source_remap.entry((from_previous, index)).or_insert_with(|| {
                let owner = if from_previous { previous } else { self };
                let name = owner.sources[index as usize].clone();
                let content = owner.source_content(index).map(str::to_string);
                if let Some(existing) = sources.iter().position(|s| *s == name) {
                    if sources_content[existing].is_none() {
                        sources_content[existing] = content;
                    }
                    existing as u32
                } else {
                    sources.push(name);
                    sources_content.push(content);
                    (sources.len() - 1) as u32
                }
            })
        };
        let mut intern_name = |from_previous: bool, index: u32| -> u32 {
            *name_remap.entry((from_previous, index)).or_insert_with(|| {
                let owner = if from_previous { previous } else { self };
                let name = owner.names[index as usize].clone();
                if let Some(existing) = names.iter().position(|n| *n == name) {
                    existing as u32
                } else {
                    names.push(name);
                    (names.len() - 1) as u32
                }
            })
        };

        let mut lines: Vec<Vec<Segment>> = Vec::with_capacity(self.lines.len());
        for segments in &self.lines {
            let mut composed = Vec::with_capacity(segments.len());
            for segment in segments {
                let original = match segment.original {
                    None => None,
                    Some(pos) if Some(pos.source) == input_index => {
                        match previous.lookup(pos.line, pos.column) {
                            Some(Segment {
                                original: Some(prev),
                                ..
                            }) => Some(OriginalPosition {
                                source: intern_source(true, prev.source),
                                line: prev.line,
                                column: prev.column,
                                name: prev
                                    .name
                                    .map(|n| intern_name(true, n))
                                    .or_else(|| pos.name.map(|n| intern_name(false, n))),
                            }),
                            // The previous stage generated this text itself.
                            _ => None,
                        }
                    }
                    Some(pos) => Some(OriginalPosition {
                        source: intern_source(false, pos.source),
                        line: pos.line,
                        column: pos.column,
                        name: pos.name.map(|n| intern_name(false, n)),
                    }),
                };
                composed.push(Segment {
                    generated_column: segment.generated_column,
                    original,
                });
            }
            composed.dedup_by(|b, a| a.generated_column == b.generated_column);
            lines.push(composed);
        }

        SourceMap {
            file: self.file.clone(),
            source_root: self.source_root.clone().or_else(|| previous.source_root.clone()),
            sources,
            sources_content,
            names,
            lines,
        }
    }
}
