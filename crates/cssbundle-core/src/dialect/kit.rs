//! The bundled mixin kit.
//!
//! Copyright (c) 2025 Posit, PBC
//!
//! A small library of SCSS mixins and functions embedded at compile time and
//! exposed to the engine under the virtual prefix `/__cssbundle__/kit`.
//! Importing its index emits no CSS; only included mixins do.

use std::collections::HashSet;
use std::path::{Component, Path};
use std::sync::OnceLock;

use cssbundle_runtime::EmbeddedResourceProvider;
use include_dir::{Dir, include_dir};

static KIT_DIR: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/resources/kit");

/// Virtual directory the kit is mounted at.
pub const KIT_PREFIX: &str = "/__cssbundle__/kit";

/// Import directive that brings the whole kit into scope.
pub fn kit_import() -> String {
    format!("@import \"{KIT_PREFIX}/index\";")
}

/// The embedded kit as an [`EmbeddedResourceProvider`].
///
/// Only paths below [`KIT_PREFIX`] are answered so user files are never
/// shadowed.
pub struct Kit {
    dir: &'static Dir<'static>,
    directories: OnceLock<HashSet<String>>,
}

impl Kit {
    pub const fn new() -> Self {
        Self {
            dir: &KIT_DIR,
            directories: OnceLock::new(),
        }
    }

    /// Path of `path` inside the kit, if it is below the prefix.
    fn relative(path: &Path) -> Option<String> {
        let rest = path.strip_prefix(KIT_PREFIX).ok()?;
        let parts: Option<Vec<_>> = rest
            .components()
            .map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Some(parts?.join("/"))
    }

    fn directories(&self) -> &HashSet<String> {
        self.directories.get_or_init(|| {
            let mut dirs = HashSet::new();
            collect_directories(self.dir, &mut dirs);
            dirs
        })
    }

    /// Number of embedded files.
    pub fn file_count(&self) -> usize {
        count_files(self.dir)
    }
}

impl Default for Kit {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedResourceProvider for Kit {
    fn is_file(&self, path: &Path) -> bool {
        Self::relative(path).is_some_and(|rel| !rel.is_empty() && self.dir.get_file(&rel).is_some())
    }

    fn is_dir(&self, path: &Path) -> bool {
        Self::relative(path).is_some_and(|rel| rel.is_empty() || self.directories().contains(&rel))
    }

    fn read(&self, path: &Path) -> Option<&'static [u8]> {
        let rel = Self::relative(path)?;
        self.dir.get_file(&rel).map(|f| f.contents())
    }
}

fn collect_directories(dir: &Dir<'static>, dirs: &mut HashSet<String>) {
    for subdir in dir.dirs() {
        dirs.insert(subdir.path().to_string_lossy().to_string());
        collect_directories(subdir, dirs);
    }
}

fn count_files(dir: &Dir<'static>) -> usize {
    dir.files().count() + dir.dirs().map(count_files).sum::<usize>()
}
