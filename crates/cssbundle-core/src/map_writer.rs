/*
 * map_writer.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Persisting the source map next to the stylesheet.
 */

use std::path::Path;

use cssbundle_runtime::SystemRuntime;
use cssbundle_source_map::SourceMap;

use crate::config::SourcemapMode;
use crate::error::WriteError;

/// Write `map` to `path` when `mode` is [`SourcemapMode::File`].
///
/// Disabled and inline maps are never written.
pub fn write_map(
    runtime: &dyn SystemRuntime,
    path: &Path,
    map: &SourceMap,
    mode: SourcemapMode,
) -> Result<(), WriteError> {
    if mode != SourcemapMode::File {
        return Ok(());
    }
    let json = map.to_json().map_err(|source| WriteError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    runtime
        .file_write(path, json.as_bytes())
        .map_err(|source| WriteError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(path = %path.display(), bytes = json.len(), "Wrote source map");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cssbundle_runtime::MemoryRuntime;
    use cssbundle_source_map::identity_map;

    fn map() -> SourceMap {
        identity_map("bundle.css", "../blocks/a.scss", ".a {}\n")
    }

    #[test]
    fn test_file_mode_writes_json() {
        let runtime = MemoryRuntime::new();
        runtime.dir_create(Path::new("/project/bundle"), true).unwrap();
        let path = Path::new("/project/bundle/bundle.css.map");

        write_map(&runtime, path, &map(), SourcemapMode::File).unwrap();

        let json = runtime.file_read_string(path).unwrap();
        assert_eq!(SourceMap::from_json(&json).unwrap(), map());
    }

    #[test]
    fn test_off_and_inline_write_nothing() {
        let runtime = MemoryRuntime::new();
        let path = Path::new("/project/bundle.css.map");
        for mode in [SourcemapMode::Off, SourcemapMode::Inline] {
            write_map(&runtime, path, &map(), mode).unwrap();
        }
        assert!(!runtime.is_file(path).unwrap());
    }

    #[test]
    fn test_missing_directory_is_write_error() {
        let runtime = MemoryRuntime::new();
        let path = Path::new("/nowhere/bundle.css.map");
        let err = write_map(&runtime, path, &map(), SourcemapMode::File).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
    }
}
