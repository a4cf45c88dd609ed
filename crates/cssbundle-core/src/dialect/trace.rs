/*
 * dialect/trace.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Source tracing through the dialect engine.
 */

//! Source tracing.
//!
//! The engine flattens every imported file into one output, losing track of
//! which text came from where. To recover that, each file is wrapped in loud
//! comments as it is loaded:
//!
//! ```text
//! /*! cssbundle-trace begin 3 */
//! ...file content...
//! /*! cssbundle-trace end 3 */
//! ```
//!
//! Loud comments survive expanded rendering, so the output splits back into
//! [`Part`]s attributed to the innermost open file. Plain CSS entries of the
//! import document are passed as `/*! cssbundle-import N */` placeholders
//! and substituted after rendering.

use std::collections::HashMap;
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use cssbundle_source_map::{LineIndex, SourceMap, SourceMapBuilder};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::source::{normalize, relative_path};
use crate::url::rebase_imports;

static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/\*! cssbundle-(trace begin|trace end|import) (\d+) \*/[ \t]*\n?").unwrap()
});

pub fn begin_comment(index: usize) -> String {
    format!("/*! cssbundle-trace begin {index} */\n")
}

pub fn end_comment(index: usize) -> String {
    format!("\n/*! cssbundle-trace end {index} */\n")
}

pub fn placeholder(index: usize) -> String {
    format!("/*! cssbundle-import {index} */\n")
}

/// A file the engine loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub content: String,
}

/// Records and wraps every file handed to the engine.
///
/// When `import_base` is set, string `@import "x.css"` targets inside loaded
/// files are rebased onto it, so plain imports stay valid wherever the
/// engine places them.
#[derive(Debug, Default)]
pub struct FileTracer {
    files: Mutex<Vec<LoadedFile>>,
    import_base: Option<PathBuf>,
}

impl FileTracer {
    pub fn new(import_base: Option<PathBuf>) -> Self {
        Self {
            files: Mutex::new(Vec::new()),
            import_base,
        }
    }

    /// Record `content` loaded from `path` and return the wrapped text.
    pub fn load(&self, path: &Path, content: &[u8]) -> Vec<u8> {
        let path = normalize(path);
        let text = String::from_utf8_lossy(content).into_owned();
        let body = match &self.import_base {
            Some(base) => rebase_plain_imports(&text, &path, base),
            None => text.clone(),
        };

        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        let index = files.len();
        files.push(LoadedFile {
            path: path.clone(),
            content: text,
        });
        tracing::trace!(index, path = %path.display(), "Traced load");

        let mut wrapped = begin_comment(index);
        wrapped.push_str(&body);
        wrapped.push_str(&end_comment(index));
        wrapped.into_bytes()
    }

    pub fn into_files(self) -> Vec<LoadedFile> {
        self.files
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn rebase_plain_imports(text: &str, from: &Path, base: &Path) -> String {
    if !text.contains("@import") {
        return text.to_string();
    }
    // Only `.css` targets are plain imports; others are resolved by the engine.
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if line.contains(".css\"") || line.contains(".css'") {
            out.push_str(&rebase_imports(line, from, base));
        } else {
            out.push_str(line);
        }
    }
    out
}

/// `grass::Fs` wrapper feeding every read through a [`FileTracer`].
pub struct TracingFs<'a> {
    inner: &'a dyn grass::Fs,
    tracer: &'a FileTracer,
}

impl<'a> TracingFs<'a> {
    pub fn new(inner: &'a dyn grass::Fs, tracer: &'a FileTracer) -> Self {
        Self { inner, tracer }
    }
}

impl Debug for TracingFs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingFs")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl grass::Fs for TracingFs<'_> {
    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let content = self.inner.read(path)?;
        Ok(self.tracer.load(path, &content))
    }
}

/// A slice of traced output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part<'a> {
    /// Rendered text; `origin` is the innermost open file
    Text { text: &'a str, origin: Option<usize> },
    /// A file starts; `depth` is the number of files already open
    Begin { file: usize, depth: usize },
    End { file: usize, depth: usize },
    /// Placeholder for the plain entry at this document index
    Plain(usize),
}

/// Split traced engine output into parts.
///
/// Unbalanced markers are tolerated; an `end` closes the matching file and
/// anything opened after it.
pub fn split(css: &str) -> Vec<Part<'_>> {
    let mut parts = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut last = 0;

    for caps in MARKER_RE.captures_iter(css) {
        let Some(whole) = caps.get(0) else { continue };
        let Ok(index) = caps[2].parse::<usize>() else {
            continue;
        };
        if whole.start() > last {
            parts.push(Part::Text {
                text: &css[last..whole.start()],
                origin: open.last().copied(),
            });
        }
        last = whole.end();

        match &caps[1] {
            "trace begin" => {
                parts.push(Part::Begin {
                    file: index,
                    depth: open.len(),
                });
                open.push(index);
            }
            "trace end" => {
                if let Some(pos) = open.iter().rposition(|&f| f == index) {
                    open.truncate(pos);
                }
                parts.push(Part::End {
                    file: index,
                    depth: open.len(),
                });
            }
            _ => parts.push(Part::Plain(index)),
        }
    }

    if last < css.len() {
        parts.push(Part::Text {
            text: &css[last..],
            origin: open.last().copied(),
        });
    }
    parts
}

/// A piece of final output attributed to a loaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub origin: Option<usize>,
}

/// Build the map of `css` from its attributed spans.
///
/// Every output line that starts a selector or declaration is located in
/// the source it came from by searching its leading token, moving forward
/// from the previous hit. Lines whose token cannot be found map to the last
/// known position in that file.
pub fn locate_map(
    css: &str,
    spans: &[Span],
    files: &[LoadedFile],
    output_path: &Path,
) -> SourceMap {
    let file_name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output_dir = output_path.parent().unwrap_or(Path::new(""));

    let mut builder = SourceMapBuilder::new(file_name);
    let mut sources: HashMap<usize, (u32, LineIndex)> = HashMap::new();
    let mut cursors: HashMap<usize, usize> = HashMap::new();
    let output_index = LineIndex::new(css);

    for span in spans {
        let Some(origin) = span.origin else { continue };
        let Some(loaded) = files.get(origin) else {
            continue;
        };
        let (source, index) = sources.entry(origin).or_insert_with(|| {
            let name = relative_path(output_dir, &loaded.path);
            (
                builder.add_source(&name, Some(&loaded.content)),
                LineIndex::new(&loaded.content),
            )
        });

        let mut line_start = span.start;
        for line in css[span.start..span.end].split_inclusive('\n') {
            let indent = line.len() - line.trim_start().len();
            let token_at = line_start + indent;
            line_start += line.len();

            let Some(token) = leading_token(line.trim()) else {
                continue;
            };
            let Some((gen_line, gen_col)) = output_index.line_col(css, token_at) else {
                continue;
            };

            let cursor = cursors.entry(origin).or_insert(0);
            let found = find_token(&loaded.content, token, *cursor);
            if let Some(offset) = found {
                *cursor = offset;
            }
            if let Some((line, column)) = index.line_col(&loaded.content, *cursor) {
                builder.map_to(gen_line, gen_col, *source, line, column);
            }
        }
    }

    builder.ensure_lines(output_index.line_count());
    builder.build()
}

/// The searchable head of an output line, if it starts a construct.
fn leading_token(line: &str) -> Option<&str> {
    if line.is_empty() || line.starts_with('}') || line.starts_with("/*") {
        return None;
    }
    if line.starts_with('@') {
        return line
            .split_whitespace()
            .next()
            .map(|name| name.trim_end_matches(['{', ';']));
    }
    if let Some(selector) = line.strip_suffix('{') {
        // Nested selectors are expanded; the last compound is what the
        // source spells out, and only its pseudo part survives `&:hover`.
        let selector = selector.trim_end();
        let last = selector
            .rsplit([' ', ',', '>', '+', '~'])
            .find(|s| !s.is_empty())
            .unwrap_or(selector)
            .trim_start_matches('&');
        let last = match last.find(':') {
            Some(at) if at > 0 => &last[at..],
            _ => last,
        };
        return Some(last).filter(|s| !s.is_empty());
    }
    line.split(':').next().map(str::trim).filter(|s| !s.is_empty())
}

fn find_token(content: &str, token: &str, from: usize) -> Option<usize> {
    let from = from.min(content.len());
    if !content.is_char_boundary(from) {
        return content.find(token);
    }
    content[from..]
        .find(token)
        .map(|i| i + from)
        .or_else(|| content.find(token))
}
