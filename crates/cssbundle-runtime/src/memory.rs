/*
 * memory.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * MemoryRuntime: SystemRuntime backed by an in-memory filesystem.
 */

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use crate::traits::{PathKind, PathMetadata, RuntimeError, RuntimeResult, SystemRuntime};

/// Helper function to create a "not found" error.
fn not_found_error(path: &Path) -> RuntimeError {
    RuntimeError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("Path not found: {}", path.display()),
    ))
}

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: Vec<u8>,
    /// Write counter value at the last write; reported as the modification time.
    revision: u64,
}

/// In-memory filesystem state.
///
/// Directories are created implicitly for the parents of every file.
#[derive(Debug)]
pub struct VirtualFileSystem {
    files: HashMap<PathBuf, MemoryFile>,
    directories: HashSet<PathBuf>,
    root: PathBuf,
    revision: u64,
}

impl VirtualFileSystem {
    /// Create an empty filesystem whose working directory is `root`.
    pub fn with_root(root: PathBuf) -> Self {
        let mut vfs = Self {
            files: HashMap::new(),
            directories: HashSet::new(),
            root: PathBuf::new(),
            revision: 0,
        };
        vfs.directories.insert(PathBuf::from("/"));
        let root = vfs.normalize_components(&PathBuf::from("/").join(root));
        vfs.add_directory_and_parents(&root);
        vfs.root = root;
        vfs
    }

    /// Add or replace a file, creating its parent directories.
    pub fn add_file(&mut self, path: &Path, contents: Vec<u8>) {
        let normalized = self.normalize_path(path);
        if let Some(parent) = normalized.parent() {
            self.add_directory_and_parents(parent);
        }
        self.revision += 1;
        self.files.insert(
            normalized,
            MemoryFile {
                contents,
                revision: self.revision,
            },
        );
    }

    /// Remove a file. Returns true if the file existed.
    pub fn remove_file(&mut self, path: &Path) -> bool {
        let normalized = self.normalize_path(path);
        self.files.remove(&normalized).is_some()
    }

    /// Add a directory (and all parent directories).
    pub fn add_directory(&mut self, path: &Path) {
        let normalized = self.normalize_path(path);
        self.add_directory_and_parents(&normalized);
    }

    /// List all files, sorted.
    pub fn list_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.files.keys().cloned().collect();
        files.sort();
        files
    }

    pub fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(&self.normalize_path(path))
    }

    pub fn is_directory(&self, path: &Path) -> bool {
        self.directories.contains(&self.normalize_path(path))
    }

    pub fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        let normalized = self.normalize_path(path);
        self.files
            .get(&normalized)
            .map(|f| f.contents.clone())
            .ok_or_else(|| not_found_error(&normalized))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalize a path to an absolute path (relative paths resolve against the root).
    pub fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return self.normalize_components(path);
        }
        self.normalize_components(&self.root.join(path))
    }

    fn normalize_components(&self, path: &Path) -> PathBuf {
        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        normalized.push("/");
                    }
                }
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }
        if normalized.as_os_str().is_empty() {
            normalized.push("/");
        }
        normalized
    }

    fn add_directory_and_parents(&mut self, path: &Path) {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            self.directories.insert(current.clone());
        }
    }
}

/// Runtime operating on a [`VirtualFileSystem`].
///
/// Every write bumps a counter that is reported as the file's modification
/// time, so change detection behaves like it does on disk.
#[derive(Debug)]
pub struct MemoryRuntime {
    vfs: RwLock<VirtualFileSystem>,
}

impl MemoryRuntime {
    /// Create a runtime rooted at `/project`.
    pub fn new() -> Self {
        Self::with_root("/project")
    }

    /// Create a runtime with a custom working directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            vfs: RwLock::new(VirtualFileSystem::with_root(root.into())),
        }
    }

    /// Add a file (convenience for populating fixtures).
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        self.vfs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_file(path.as_ref(), contents.into());
    }

    /// List all files currently stored.
    pub fn list_files(&self) -> Vec<PathBuf> {
        self.vfs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .list_files()
    }
}

impl Default for MemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemRuntime for MemoryRuntime {
    fn file_read(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        self.vfs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .read_file(path)
    }

    fn file_write(&self, path: &Path, contents: &[u8]) -> RuntimeResult<()> {
        let mut vfs = self.vfs.write().unwrap_or_else(PoisonError::into_inner);
        let normalized = vfs.normalize_path(path);
        if let Some(parent) = normalized.parent() {
            if !vfs.is_directory(parent) {
                return Err(not_found_error(parent));
            }
        }
        vfs.add_file(&normalized, contents.to_vec());
        Ok(())
    }

    fn path_exists(&self, path: &Path, kind: Option<PathKind>) -> RuntimeResult<bool> {
        let vfs = self.vfs.read().unwrap_or_else(PoisonError::into_inner);
        let exists = match kind {
            None => vfs.is_file(path) || vfs.is_directory(path),
            Some(PathKind::File) => vfs.is_file(path),
            Some(PathKind::Directory) => vfs.is_directory(path),
        };
        Ok(exists)
    }

    fn path_metadata(&self, path: &Path) -> RuntimeResult<PathMetadata> {
        let vfs = self.vfs.read().unwrap_or_else(PoisonError::into_inner);
        let normalized = vfs.normalize_path(path);

        if let Some(file) = vfs.files.get(&normalized) {
            Ok(PathMetadata {
                kind: PathKind::File,
                size: file.contents.len() as u64,
                modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(file.revision)),
            })
        } else if vfs.directories.contains(&normalized) {
            Ok(PathMetadata {
                kind: PathKind::Directory,
                size: 0,
                modified: None,
            })
        } else {
            Err(not_found_error(&normalized))
        }
    }

    fn path_rename(&self, old: &Path, new: &Path) -> RuntimeResult<()> {
        let mut vfs = self.vfs.write().unwrap_or_else(PoisonError::into_inner);
        let contents = vfs.read_file(old)?;
        vfs.remove_file(old);
        vfs.add_file(new, contents);
        Ok(())
    }

    fn dir_create(&self, path: &Path, _recursive: bool) -> RuntimeResult<()> {
        // Parents are always created
        self.vfs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_directory(path);
        Ok(())
    }

    fn cwd(&self) -> RuntimeResult<PathBuf> {
        Ok(self
            .vfs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .root()
            .to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vfs_creates_parent_directories() {
        let rt = MemoryRuntime::new();
        rt.add_file("/project/blocks/a/a.scss", "a {}");

        assert!(rt.is_dir(Path::new("/project/blocks")).unwrap());
        assert!(rt.is_dir(Path::new("/project/blocks/a")).unwrap());
        assert!(rt.is_file(Path::new("/project/blocks/a/a.scss")).unwrap());
    }

    #[test]
    fn test_relative_paths_resolve_against_root() {
        let rt = MemoryRuntime::with_root("/work");
        rt.add_file("blocks/b.css", "b {}");

        assert_eq!(
            rt.file_read_string(Path::new("/work/blocks/b.css")).unwrap(),
            "b {}"
        );
        assert_eq!(
            rt.file_read_string(Path::new("/work/bundle/../blocks/b.css"))
                .unwrap(),
            "b {}"
        );
        assert_eq!(rt.cwd().unwrap(), PathBuf::from("/work"));
    }

    #[test]
    fn test_write_requires_existing_parent() {
        let rt = MemoryRuntime::new();
        let result = rt.file_write(Path::new("/project/missing/out.css"), b"x");
        assert!(result.unwrap_err().is_not_found());

        rt.dir_create(Path::new("/project/missing"), true).unwrap();
        rt.file_write(Path::new("/project/missing/out.css"), b"x")
            .unwrap();
    }

    #[test]
    fn test_modified_changes_on_write() {
        let rt = MemoryRuntime::new();
        let path = Path::new("/project/globals.scss");
        rt.add_file(path, "$a: 1;");
        let first = rt.path_metadata(path).unwrap().modified;

        rt.add_file(path, "$a: 2;");
        let second = rt.path_metadata(path).unwrap().modified;

        assert_ne!(first, second);
    }

    #[test]
    fn test_rename_moves_contents() {
        let rt = MemoryRuntime::new();
        rt.add_file("/project/a.tmp", "data");
        rt.path_rename(Path::new("/project/a.tmp"), Path::new("/project/a"))
            .unwrap();

        assert!(!rt.is_file(Path::new("/project/a.tmp")).unwrap());
        assert_eq!(rt.file_read(Path::new("/project/a")).unwrap(), b"data");
        assert_eq!(rt.list_files(), vec![PathBuf::from("/project/a")]);
    }
}
