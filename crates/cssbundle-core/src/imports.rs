/*
 * imports.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Import-list builder: the synthetic stylesheet handed to the dialect engine.
 */

//! Import-list builder.
//!
//! Turns the ordered source files of a build unit, plus its globals, into an
//! [`ImportDocument`]: one `@import` per logical file, globals first, with
//! optional `/* <path>:begin */` / `/* <path>:end */` boundary comments.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::UnknownSuffixPolicy;
use crate::error::ImportResolutionError;
use crate::source::{Dialect, SourceFile, relative_path};

/// Options of [`build_import_document`].
#[derive(Debug, Clone)]
pub struct ImportOptions<'a> {
    /// Unit root, the base of relative globals
    pub root: &'a Path,
    /// Directory of the output file; import paths are relative to it
    pub output_dir: &'a Path,
    pub comments: bool,
    pub suffixes: &'a [String],
    pub unknown_suffix: UnknownSuffixPolicy,
}

/// One retained entity of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub full_path: PathBuf,
    /// Path relative to the output directory, `/` separated
    pub url: String,
    pub dialect: Dialect,
    pub global: bool,
}

/// The ordered import list of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportDocument {
    pub entries: Vec<ImportEntry>,
    pub comments: bool,
}

impl ImportDocument {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries compiled by the dialect engine.
    pub fn preprocessor_entries(&self) -> impl Iterator<Item = &ImportEntry> {
        self.entries
            .iter()
            .filter(|e| e.dialect == Dialect::Preprocessor)
    }

    /// Render the document as dialect source text.
    ///
    /// Preprocessor entries get boundary comments when comments are on;
    /// plain entries never do, the post-processing import stage adds them.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let markers = self.comments && entry.dialect == Dialect::Preprocessor;
            if markers {
                let _ = writeln!(out, "{}", begin_marker(&entry.url));
            }
            let _ = writeln!(out, "{}", import_directive(&entry.url));
            if markers {
                let _ = writeln!(out, "{}", end_marker(&entry.url));
            }
        }
        out
    }
}

pub fn begin_marker(url: &str) -> String {
    format!("/* {url}:begin */")
}

pub fn end_marker(url: &str) -> String {
    format!("/* {url}:end */")
}

/// Whether a comment, given with its delimiters, is a boundary marker.
pub fn is_marker(comment: &str) -> bool {
    comment
        .strip_prefix("/* ")
        .and_then(|c| c.strip_suffix(" */"))
        .is_some_and(|label| label.ends_with(":begin") || label.ends_with(":end"))
}

pub fn import_directive(url: &str) -> String {
    format!("@import \"{}\";", url.replace('"', "\\\""))
}

/// Build the import document for `sources` and `globals`.
///
/// Globals come first, in their configured order. Every entry is filtered
/// by base name: the first file of each logical entity wins, so a source
/// already imported as a global is not imported again.
pub fn build_import_document(
    sources: &[SourceFile],
    globals: &[String],
    options: &ImportOptions<'_>,
) -> Result<ImportDocument, ImportResolutionError> {
    let mut entries = Vec::with_capacity(globals.len() + sources.len());
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for global in globals {
        let file = SourceFile::resolve(options.root, Path::new(global), options.suffixes);
        if !seen.insert(file.base_name.clone()) {
            tracing::debug!(global = %global, "Skipping global, it is already imported");
            continue;
        }
        entries.push(entry_for(&file, true, options)?);
    }

    for file in sources {
        if !seen.insert(file.base_name.clone()) {
            tracing::debug!(
                file = %file.relative_path,
                "Skipping source, an earlier file has the same base name"
            );
            continue;
        }
        entries.push(entry_for(file, false, options)?);
    }

    Ok(ImportDocument {
        entries,
        comments: options.comments,
    })
}

fn entry_for(
    file: &SourceFile,
    global: bool,
    options: &ImportOptions<'_>,
) -> Result<ImportEntry, ImportResolutionError> {
    let dialect = match file.dialect() {
        Some(dialect) if file.has_configured_suffix(options.suffixes) => dialect,
        _ => match options.unknown_suffix {
            UnknownSuffixPolicy::PassThrough => Dialect::Plain,
            UnknownSuffixPolicy::Fail => {
                return Err(ImportResolutionError::UnknownSuffix {
                    path: file.full_path.clone(),
                });
            }
        },
    };

    Ok(ImportEntry {
        full_path: file.full_path.clone(),
        url: relative_path(options.output_dir, &file.full_path),
        dialect,
        global,
    })
}
