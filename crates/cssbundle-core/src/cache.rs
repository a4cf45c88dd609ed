/*
 * cache.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Rebuild-decision cache for the globals file set.
 */

//! Rebuild-decision cache.
//!
//! Globals are imported by every build of a unit but are not part of the
//! host's dependency graph, so their state is fingerprinted here and compared
//! against the record left by the previous successful build.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use cssbundle_runtime::{RuntimeResult, SystemRuntime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::source::normalize;

/// Everything known about one globals entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub path: PathBuf,
    pub exists: bool,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub modified: Option<u64>,
    /// `sha256:<hex>` of the content
    pub hash: Option<String>,
}

impl FileFingerprint {
    fn capture(runtime: &dyn SystemRuntime, path: PathBuf) -> RuntimeResult<Self> {
        let metadata = match runtime.path_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.is_not_found() => {
                return Ok(Self {
                    path,
                    exists: false,
                    size: 0,
                    modified: None,
                    hash: None,
                });
            }
            Err(e) => return Err(e),
        };

        let contents = runtime.file_read(&path)?;
        let modified = metadata
            .modified
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64);

        Ok(Self {
            path,
            exists: true,
            size: metadata.size,
            modified,
            hash: Some(sha256_hash(&contents)),
        })
    }
}

/// Compute the SHA-256 of `content` in `sha256:<hex>` form.
pub fn sha256_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    format!("sha256:{:x}", digest)
}

/// Fingerprints of the whole globals list, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalsState {
    pub entries: Vec<FileFingerprint>,
}

impl GlobalsState {
    /// Fingerprint `globals` (relative to `root` or absolute).
    ///
    /// Missing files are recorded as such; only unreadable existing files
    /// are an error.
    pub fn capture(
        runtime: &dyn SystemRuntime,
        root: &Path,
        globals: &[String],
    ) -> RuntimeResult<Self> {
        let entries = globals
            .iter()
            .map(|g| FileFingerprint::capture(runtime, normalize(&root.join(g))))
            .collect::<RuntimeResult<Vec<_>>>()?;
        Ok(Self { entries })
    }
}

/// Whether the globals changed since `previous` was captured.
pub fn needs_rebuild(previous: Option<&GlobalsState>, current: &GlobalsState) -> bool {
    match previous {
        None => true,
        Some(previous) => previous != current,
    }
}

/// Persists one [`GlobalsState`] per build unit as JSON.
#[derive(Clone)]
pub struct CacheStore {
    runtime: Arc<dyn SystemRuntime>,
    dir: PathBuf,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new(runtime: Arc<dyn SystemRuntime>, dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            dir: dir.into(),
        }
    }

    /// Location of the record for `unit`.
    pub fn path_for(&self, unit: &str) -> PathBuf {
        self.dir.join(format!("{unit}.globals.json"))
    }

    /// Load the previous state of `unit`.
    ///
    /// A missing, unreadable or corrupt record yields `None`, which means
    /// "rebuild".
    pub fn load(&self, unit: &str) -> Option<GlobalsState> {
        let path = self.path_for(unit);
        let text = match self.runtime.file_read_string(&path) {
            Ok(text) => text,
            Err(e) if e.is_not_found() => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable globals cache");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Discarding corrupt globals cache");
                None
            }
        }
    }

    /// Persist `state` for `unit`, replacing the previous record atomically.
    pub fn store(&self, unit: &str, state: &GlobalsState) -> RuntimeResult<()> {
        self.runtime.dir_create(&self.dir, true)?;
        let path = self.path_for(unit);
        let tmp = self.dir.join(format!("{unit}.globals.json.tmp"));
        let json = serde_json::to_vec_pretty(state).map_err(std::io::Error::other)?;
        self.runtime.file_write(&tmp, &json)?;
        self.runtime.path_rename(&tmp, &path)
    }
}
