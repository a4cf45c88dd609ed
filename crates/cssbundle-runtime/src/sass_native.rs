/*
 * sass_native.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * grass bindings: SCSS compiled against a SystemRuntime.
 */

//! grass reads every `@use`, `@forward` and `@import` target through
//! [`RuntimeFs`], so the dialect phase sees the same files as the rest of
//! the build. The bundled mixin kit is served by an
//! [`EmbeddedResourceProvider`] ahead of the runtime.

use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};

use grass::{InputSyntax, Options, OutputStyle};

use crate::traits::{RuntimeError, RuntimeResult, SystemRuntime};

/// Stylesheets compiled into the binary, addressed under a virtual prefix
/// such as `/__cssbundle__/kit/`.
pub trait EmbeddedResourceProvider: Send + Sync {
    fn is_file(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn read(&self, path: &Path) -> Option<&'static [u8]>;
}

/// `grass::Fs` over a runtime, with optional embedded stylesheets that
/// shadow runtime paths.
pub struct RuntimeFs<'a> {
    runtime: &'a dyn SystemRuntime,
    embedded: Option<&'a dyn EmbeddedResourceProvider>,
}

impl<'a> RuntimeFs<'a> {
    pub fn new(runtime: &'a dyn SystemRuntime) -> Self {
        Self {
            runtime,
            embedded: None,
        }
    }

    pub fn with_embedded(
        runtime: &'a dyn SystemRuntime,
        embedded: &'a dyn EmbeddedResourceProvider,
    ) -> Self {
        Self {
            runtime,
            embedded: Some(embedded),
        }
    }
}

impl Debug for RuntimeFs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeFs")
            .field("runtime", &"<SystemRuntime>")
            .field("embedded", &self.embedded.is_some())
            .finish()
    }
}

impl grass::Fs for RuntimeFs<'_> {
    fn is_dir(&self, path: &Path) -> bool {
        if let Some(embedded) = self.embedded {
            if embedded.is_dir(path) {
                return true;
            }
        }
        self.runtime.is_dir(path).unwrap_or(false)
    }

    fn is_file(&self, path: &Path) -> bool {
        if let Some(embedded) = self.embedded {
            if embedded.is_file(path) {
                return true;
            }
        }
        self.runtime.is_file(path).unwrap_or(false)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        if let Some(embedded) = self.embedded {
            if let Some(content) = embedded.read(path) {
                return Ok(content.to_vec());
            }
        }
        self.runtime.file_read(path).map_err(|e| match e {
            RuntimeError::Io(io_err) => io_err,
            other => io::Error::other(other.to_string()),
        })
    }
}

fn output_style(minified: bool) -> OutputStyle {
    if minified {
        OutputStyle::Compressed
    } else {
        OutputStyle::Expanded
    }
}

/// Serves the source under compilation at its own path, so grass resolves
/// the entry's relative imports from the directory it claims to live in.
#[derive(Debug)]
struct EntryFs<'a> {
    inner: &'a dyn grass::Fs,
    path: &'a Path,
    source: &'a str,
}

impl grass::Fs for EntryFs<'_> {
    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        path == self.path || self.inner.is_file(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        if path == self.path {
            return Ok(self.source.as_bytes().to_vec());
        }
        self.inner.read(path)
    }
}

/// Compile SCSS source as if it lived at `input_path`, reading imports
/// through any `grass::Fs`.
///
/// The file at `input_path` itself is never read. Callers wrap
/// [`RuntimeFs`] to observe or adjust the files grass loads; compiler
/// diagnostics come back as [`RuntimeError::SassError`].
pub fn compile_scss_with_fs(
    fs: &dyn grass::Fs,
    scss: &str,
    input_path: &Path,
    load_paths: &[PathBuf],
    minified: bool,
) -> RuntimeResult<String> {
    let entry = EntryFs {
        inner: fs,
        path: input_path,
        source: scss,
    };
    let options = Options::default()
        .fs(&entry)
        .load_paths(load_paths)
        .input_syntax(InputSyntax::Scss)
        .style(output_style(minified))
        .quiet(true);

    grass::from_path(input_path, &options).map_err(|e| RuntimeError::SassError(e.to_string()))
}
