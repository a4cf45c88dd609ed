//! Source Map v3 model.
//!
//! Mappings are kept decoded, one vector of segments per generated line;
//! the VLQ text form only exists at the JSON boundary.

use serde::{Deserialize, Serialize};

use crate::error::SourceMapError;
use crate::vlq;

/// A position in one of the map's sources (all zero-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginalPosition {
    /// Index into [`SourceMap::sources`]
    pub source: u32,
    pub line: u32,
    pub column: u32,
    /// Index into [`SourceMap::names`]
    pub name: Option<u32>,
}

/// One mapping segment on a generated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    pub generated_column: u32,
    /// `None` marks generated text with no origin
    pub original: Option<OriginalPosition>,
}

/// A decoded Source Map v3.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    pub file: Option<String>,
    pub source_root: Option<String>,
    pub sources: Vec<String>,
    pub sources_content: Vec<Option<String>>,
    pub names: Vec<String>,
    /// Segments per generated line, sorted by generated column
    pub lines: Vec<Vec<Segment>>,
}

/// JSON shape of a v3 map.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_root: Option<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sources_content: Vec<Option<String>>,
    #[serde(default)]
    names: Vec<String>,
    mappings: String,
}

impl SourceMap {
    /// Create an empty map for the generated file `file`.
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            ..Self::default()
        }
    }

    /// Whether the map contains no segment with an origin.
    pub fn is_empty(&self) -> bool {
        self.lines
            .iter()
            .all(|line| line.iter().all(|s| s.original.is_none()))
    }

    /// Index of `source`, if present.
    pub fn source_index(&self, source: &str) -> Option<u32> {
        self.sources
            .iter()
            .position(|s| s == source)
            .map(|i| i as u32)
    }

    /// Content recorded for the source at `index`.
    pub fn source_content(&self, index: u32) -> Option<&str> {
        self.sources_content
            .get(index as usize)
            .and_then(|c| c.as_deref())
    }

    /// Find the segment covering a generated position: the last segment on
    /// `line` whose column is not greater than `column`.
    pub fn lookup(&self, line: u32, column: u32) -> Option<&Segment> {
        let segments = self.lines.get(line as usize)?;
        let idx = segments.partition_point(|s| s.generated_column <= column);
        if idx == 0 {
            None
        } else {
            segments.get(idx - 1)
        }
    }

    /// Iterate every segment with its generated line.
    pub fn segments(&self) -> impl Iterator<Item = (u32, &Segment)> {
        self.lines
            .iter()
            .enumerate()
            .flat_map(|(line, segments)| segments.iter().map(move |s| (line as u32, s)))
    }

    /// Encode the `mappings` field.
    pub fn encode_mappings(&self) -> String {
        let mut out = String::new();
        let mut prev_source: i64 = 0;
        let mut prev_line: i64 = 0;
        let mut prev_column: i64 = 0;
        let mut prev_name: i64 = 0;

        for (line_idx, segments) in self.lines.iter().enumerate() {
            if line_idx > 0 {
                out.push(';');
            }
            let mut prev_generated: i64 = 0;
            for (seg_idx, segment) in segments.iter().enumerate() {
                if seg_idx > 0 {
                    out.push(',');
                }
                let generated = i64::from(segment.generated_column);
                vlq::encode(generated - prev_generated, &mut out);
                prev_generated = generated;

                if let Some(original) = segment.original {
                    let source = i64::from(original.source);
                    let line = i64::from(original.line);
                    let column = i64::from(original.column);
                    vlq::encode(source - prev_source, &mut out);
                    vlq::encode(line - prev_line, &mut out);
                    vlq::encode(column - prev_column, &mut out);
                    prev_source = source;
                    prev_line = line;
                    prev_column = column;

                    if let Some(name) = original.name {
                        let name = i64::from(name);
                        vlq::encode(name - prev_name, &mut out);
                        prev_name = name;
                    }
                }
            }
        }
        out
    }

    /// Decode a `mappings` field against a map with `source_count` sources.
    pub fn decode_mappings(
        mappings: &str,
        source_count: usize,
    ) -> Result<Vec<Vec<Segment>>, SourceMapError> {
        let mut lines = Vec::new();
        let mut prev_source: i64 = 0;
        let mut prev_line: i64 = 0;
        let mut prev_column: i64 = 0;
        let mut prev_name: i64 = 0;

        for line_text in mappings.split(';') {
            let mut segments = Vec::new();
            let mut prev_generated: i64 = 0;

            for segment_text in line_text.split(',').filter(|s| !s.is_empty()) {
                let fields = vlq::decode_segment(segment_text)?;
                let generated = prev_generated + fields[0];
                prev_generated = generated;

                let original = match fields.len() {
                    1 => None,
                    4 | 5 => {
                        prev_source += fields[1];
                        prev_line += fields[2];
                        prev_column += fields[3];
                        if prev_source < 0 || prev_source as usize >= source_count {
                            return Err(SourceMapError::SourceOutOfRange(prev_source));
                        }
                        let name = if fields.len() == 5 {
                            prev_name += fields[4];
                            Some(prev_name as u32)
                        } else {
                            None
                        };
                        Some(OriginalPosition {
                            source: prev_source as u32,
                            line: prev_line.max(0) as u32,
                            column: prev_column.max(0) as u32,
                            name,
                        })
                    }
                    n => return Err(SourceMapError::InvalidSegment(n)),
                };

                segments.push(Segment {
                    generated_column: generated.max(0) as u32,
                    original,
                });
            }
            segments.sort_by_key(|s| s.generated_column);
            lines.push(segments);
        }

        Ok(lines)
    }

    /// Serialize to Source Map v3 JSON.
    pub fn to_json(&self) -> Result<String, SourceMapError> {
        let sources_content = if self.sources_content.iter().any(Option::is_some) {
            let mut content = self.sources_content.clone();
            content.resize(self.sources.len(), None);
            content
        } else {
            Vec::new()
        };

        let raw = RawSourceMap {
            version: 3,
            file: self.file.clone(),
            source_root: self.source_root.clone(),
            sources: self.sources.clone(),
            sources_content,
            names: self.names.clone(),
            mappings: self.encode_mappings(),
        };
        Ok(serde_json::to_string(&raw)?)
    }

    /// Parse Source Map v3 JSON.
    pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
        let raw: RawSourceMap = serde_json::from_str(json)?;
        if raw.version != 3 {
            return Err(SourceMapError::UnsupportedVersion(raw.version));
        }
        let lines = Self::decode_mappings(&raw.mappings, raw.sources.len())?;
        let mut sources_content = raw.sources_content;
        sources_content.resize(raw.sources.len(), None);

        Ok(Self {
            file: raw.file,
            source_root: raw.source_root,
            sources: raw.sources,
            sources_content,
            names: raw.names,
            lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SourceMap {
        SourceMap {
            file: Some("bundle.css".to_string()),
            source_root: None,
            sources: vec!["a.scss".to_string(), "b.css".to_string()],
            sources_content: vec![Some("a {}".to_string()), None],
            names: vec![],
            lines: vec![
                vec![
                    Segment {
                        generated_column: 0,
                        original: Some(OriginalPosition {
                            source: 0,
                            line: 0,
                            column: 0,
                            name: None,
                        }),
                    },
                    Segment {
                        generated_column: 4,
                        original: None,
                    },
                ],
                vec![],
                vec![Segment {
                    generated_column: 2,
                    original: Some(OriginalPosition {
                        source: 1,
                        line: 3,
                        column: 1,
                        name: None,
                    }),
                }],
            ],
        }
    }

    #[test]
    fn test_encode_mappings() {
        assert_eq!(sample().encode_mappings(), "AAAA,I;;ECGC");
    }

    #[test]
    fn test_json_keeps_sources_content() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"version\":3"));
        assert!(json.contains("\"sourcesContent\":[\"a {}\",null]"));

        let parsed = SourceMap::from_json(&json).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_lookup_picks_covering_segment() {
        let map = sample();
        assert_eq!(map.lookup(0, 2).unwrap().generated_column, 0);
        assert!(map.lookup(0, 9).unwrap().original.is_none());
        assert!(map.lookup(1, 0).is_none());
        assert!(map.lookup(2, 1).is_none());
        assert!(map.lookup(7, 0).is_none());
    }

    #[test]
    fn test_rejects_other_versions() {
        let err = SourceMap::from_json(r#"{"version":2,"sources":[],"names":[],"mappings":""}"#)
            .unwrap_err();
        assert!(matches!(err, SourceMapError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_rejects_out_of_range_source() {
        let err = SourceMap::from_json(r#"{"version":3,"sources":["a"],"names":[],"mappings":"ACAA"}"#)
            .unwrap_err();
        assert!(matches!(err, SourceMapError::SourceOutOfRange(1)));
    }
}
