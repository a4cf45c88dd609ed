/*
 * source.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Source file descriptors and path helpers.
 */

use std::path::{Component, Path, PathBuf};

/// The two stylesheet dialects a build unit may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// SCSS, compiled by the dialect engine
    Preprocessor,
    /// Plain CSS, expanded by the post-processing import stage
    Plain,
}

impl Dialect {
    /// Dialect of a configured suffix, judged by its last extension.
    ///
    /// `ie.scss` is a preprocessor suffix; anything not ending in `scss` or
    /// `css` has no known dialect.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let last = suffix.rsplit('.').next().unwrap_or(suffix);
        match last.to_ascii_lowercase().as_str() {
            "scss" => Some(Dialect::Preprocessor),
            "css" => Some(Dialect::Plain),
            _ => None,
        }
    }
}

/// A source file of a build unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub full_path: PathBuf,
    /// Path relative to the unit root, `/` separated
    pub relative_path: String,
    /// The matched suffix without the leading dot
    pub suffix: String,
    /// `full_path` without `.suffix`; files sharing it are one logical entity
    pub base_name: PathBuf,
}

impl SourceFile {
    /// Describe `path` (relative to `root` or absolute).
    ///
    /// The suffix is the longest configured suffix the file name ends with;
    /// when none matches, the last extension is used and the file has no
    /// dialect.
    pub fn resolve(root: &Path, path: &Path, suffixes: &[String]) -> Self {
        let full_path = normalize(&root.join(path));
        let relative_path = relative_path(root, &full_path);
        let file_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let suffix = match_suffix(&file_name, suffixes)
            .map(str::to_string)
            .or_else(|| {
                file_name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_string())
            })
            .unwrap_or_default();

        let base_name = if suffix.is_empty() {
            full_path.clone()
        } else {
            let full = full_path.to_string_lossy();
            PathBuf::from(&full[..full.len() - suffix.len() - 1])
        };

        Self {
            full_path,
            relative_path,
            suffix,
            base_name,
        }
    }

    pub fn dialect(&self) -> Option<Dialect> {
        Dialect::from_suffix(&self.suffix)
    }

    /// Whether the suffix is one of `suffixes`.
    pub fn has_configured_suffix(&self, suffixes: &[String]) -> bool {
        suffixes.iter().any(|s| s.trim_start_matches('.') == self.suffix)
    }
}

/// Longest entry of `suffixes` that `file_name` ends with as `.<suffix>`.
pub fn match_suffix<'a>(file_name: &str, suffixes: &'a [String]) -> Option<&'a str> {
    suffixes
        .iter()
        .map(|s| s.trim_start_matches('.'))
        .filter(|s| !s.is_empty())
        .filter(|s| {
            file_name.len() > s.len() + 1
                && file_name.ends_with(s)
                && file_name.as_bytes()[file_name.len() - s.len() - 1] == b'.'
        })
        .max_by_key(|s| s.len())
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                ) && normalized.pop();
                if !popped && !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Path of `target` as seen from the directory `from_dir`, `/` separated.
///
/// Both paths are normalized first. Falls back to `target` itself when no
/// relative path exists (different prefixes on Windows).
pub fn relative_path(from_dir: &Path, target: &Path) -> String {
    let from_dir = normalize(from_dir);
    let target = normalize(target);
    let relative = pathdiff::diff_paths(&target, &from_dir).unwrap_or(target);
    to_slash(&relative)
}

/// Render a path with `/` separators.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
        .replace("//", "/")
}
