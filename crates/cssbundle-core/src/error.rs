/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Error types for the stylesheet build.
 */

use std::path::PathBuf;

use cssbundle_runtime::RuntimeError;
use cssbundle_source_map::SourceMapError;
use thiserror::Error;

/// The dialect engine rejected the input.
///
/// Line and column are 1-based; 0 means the engine did not report one.
#[derive(Debug, Error)]
#[error("{file}:{line}:{column}: {message}")]
pub struct CompileError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl CompileError {
    pub fn new(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: 0,
            column: 0,
            message: message.into(),
        }
    }
}

/// An import target could not be turned into stylesheet text.
#[derive(Debug, Error)]
pub enum ImportResolutionError {
    #[error("Cannot resolve @import \"{target}\" from {}", importer.display())]
    Unresolved { target: String, importer: PathBuf },

    #[error("Circular @import: {}", format_chain(chain))]
    Cycle { chain: Vec<PathBuf> },

    #[error("File {} does not match any configured suffix", path.display())]
    UnknownSuffix { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: RuntimeError,
    },
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A `url(...)` target is missing or unreadable.
#[derive(Debug, Error)]
pub enum AssetResolutionError {
    #[error("Asset \"{url}\" referenced from {} not found", importer.display())]
    Missing { url: String, importer: PathBuf },

    #[error("Failed to read asset {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: RuntimeError,
    },
}

/// The dialect phase failed.
#[derive(Debug, Error)]
pub enum DialectError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Asset(#[from] AssetResolutionError),

    /// The class prefix and hoisting pass could not reprint the output
    #[error(transparent)]
    Rewrite(#[from] ProcessError),
}

/// A post-processing stage failed.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Import(#[from] ImportResolutionError),

    #[error(transparent)]
    Asset(#[from] AssetResolutionError),

    #[error("{stage}: {file}:{line}:{column}: {message}")]
    Css {
        stage: &'static str,
        file: String,
        line: u32,
        column: u32,
        message: String,
    },

    #[error("{stage}: invalid browsers query {query:?}: {message}")]
    Targets {
        stage: &'static str,
        query: String,
        message: String,
    },

    #[error("{stage}: source map error: {message}")]
    Map {
        stage: &'static str,
        message: String,
    },
}

impl ProcessError {
    pub(crate) fn source_map(stage: &'static str, message: impl ToString) -> Self {
        Self::Map {
            stage,
            message: message.to_string(),
        }
    }
}

/// Persisting the source map failed.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to write source map {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: RuntimeError,
    },

    #[error("Failed to serialize source map {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: SourceMapError,
    },
}

/// Invalid tech configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("At least one source suffix must be configured")]
    EmptySuffixes,

    #[error("Target {0:?} does not name a file")]
    InvalidTarget(String),

    #[error("Empty browsers list for autoprefixer")]
    EmptyBrowsers,

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Any failure of a build step.
///
/// Every variant is transparent so the diagnostic of the failing stage is
/// reported unchanged.
#[derive(Debug, Error)]
pub enum TechError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Import(#[from] ImportResolutionError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Asset(#[from] AssetResolutionError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl From<DialectError> for TechError {
    fn from(e: DialectError) -> Self {
        match e {
            DialectError::Compile(e) => TechError::Compile(e),
            DialectError::Asset(e) => TechError::Asset(e),
            DialectError::Rewrite(e) => TechError::Process(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_display() {
        let err = CompileError {
            file: "blocks/a.scss".to_string(),
            line: 3,
            column: 7,
            message: "Undefined variable.".to_string(),
        };
        assert_eq!(err.to_string(), "blocks/a.scss:3:7: Undefined variable.");
    }

    #[test]
    fn test_cycle_display() {
        let err = ImportResolutionError::Cycle {
            chain: vec![PathBuf::from("a.css"), PathBuf::from("b.css"), PathBuf::from("a.css")],
        };
        assert_eq!(err.to_string(), "Circular @import: a.css -> b.css -> a.css");
    }

    #[test]
    fn test_tech_error_is_transparent() {
        let inner = ImportResolutionError::Unresolved {
            target: "missing.css".to_string(),
            importer: PathBuf::from("/project/bundle/bundle.css"),
        };
        let expected = inner.to_string();
        let err = TechError::from(ProcessError::from(inner));
        assert_eq!(err.to_string(), expected);
    }
}
