/*
 * traits.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The SystemRuntime trait: file access of the stylesheet build.
 */

//! Everything the build reads or writes goes through [`SystemRuntime`], so
//! one build can run on disk ([`crate::NativeRuntime`]) or against sources a
//! host keeps in memory ([`crate::MemoryRuntime`]).

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The SCSS compiler rejected its input; the message is grass's diagnostic
    #[error("SASS compilation error: {0}")]
    SassError(String),
}

impl RuntimeError {
    /// Whether this error means the path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

/// What the rebuild cache fingerprints besides content.
#[derive(Debug, Clone)]
pub struct PathMetadata {
    pub kind: PathKind,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Last modification time, if the backend tracks one
    pub modified: Option<SystemTime>,
}

/// File operations of one build.
///
/// Calls are synchronous and never retried; a failure ends the build.
pub trait SystemRuntime: Send + Sync {
    fn file_read(&self, path: &Path) -> RuntimeResult<Vec<u8>>;

    /// Read a stylesheet or map; invalid UTF-8 is an `InvalidData` error.
    fn file_read_string(&self, path: &Path) -> RuntimeResult<String> {
        let bytes = self.file_read(path)?;
        String::from_utf8(bytes).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid UTF-8 in {}: {e}", path.display()),
            )
            .into()
        })
    }

    /// Create or replace `path`; its directory must exist.
    fn file_write(&self, path: &Path, contents: &[u8]) -> RuntimeResult<()>;

    fn path_exists(&self, path: &Path, kind: Option<PathKind>) -> RuntimeResult<bool>;

    fn is_file(&self, path: &Path) -> RuntimeResult<bool> {
        self.path_exists(path, Some(PathKind::File))
    }

    fn is_dir(&self, path: &Path) -> RuntimeResult<bool> {
        self.path_exists(path, Some(PathKind::Directory))
    }

    fn path_metadata(&self, path: &Path) -> RuntimeResult<PathMetadata>;

    /// Move `old` over `new`, replacing it.
    fn path_rename(&self, old: &Path, new: &Path) -> RuntimeResult<()>;

    fn dir_create(&self, path: &Path, recursive: bool) -> RuntimeResult<()>;

    /// Base of relative paths.
    fn cwd(&self) -> RuntimeResult<PathBuf>;
}
