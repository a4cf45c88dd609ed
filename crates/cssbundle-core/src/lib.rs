/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Stylesheet build stage.
 */

//! Stylesheet build stage for cssbundle.
//!
//! Compiles the SCSS and CSS sources of one build unit into a single
//! stylesheet in two phases:
//!
//! - [`dialect`] renders the [`imports::ImportDocument`] (globals first, one
//!   file per base name) with an SCSS engine,
//! - [`postprocess`] runs the enabled stages in a fixed order: import
//!   inlining, URL rewriting, vendor prefixing, minification.
//!
//! Source maps are threaded through both phases and composed, so the final
//! map points at the original files. [`tech::StylesheetTech`] ties the
//! phases together with the [`cache`] of globals fingerprints.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cssbundle_core::{BuildInput, StylesheetTech, TechConfig};
//! use cssbundle_runtime::NativeRuntime;
//!
//! let config = TechConfig::default();
//! let input = BuildInput::from_paths("index", "/project", &["blocks/a.scss"], &config.suffixes);
//! let tech = StylesheetTech::new(Arc::new(NativeRuntime::new()), config);
//! let artifact = tech.build(&input).await?;
//! ```

pub mod cache;
pub mod config;
pub mod dialect;
pub mod error;
pub mod imports;
pub mod map_writer;
pub mod postprocess;
pub mod source;
pub mod statements;
pub mod tech;
pub mod url;

use cssbundle_source_map::SourceMap;

pub use cache::{CacheStore, GlobalsState, needs_rebuild};
pub use config::{Autoprefixer, ImportsMode, SourcemapMode, TechConfig, UrlMode};
pub use dialect::{DialectCompiler, DialectEngine, DialectOptions, DialectPlugin, DialectSetup};
pub use error::{
    AssetResolutionError, CompileError, ConfigError, ImportResolutionError, ProcessError,
    TechError, WriteError,
};
pub use imports::{ImportDocument, ImportEntry, build_import_document};
pub use map_writer::write_map;
pub use postprocess::{PostProcessor, StageContext, TransformStage};
pub use source::{Dialect, SourceFile};
pub use tech::{BuildArtifact, BuildInput, StylesheetTech};

/// Stylesheet text with its map, when maps are on.
#[derive(Debug, Clone, Default)]
pub struct RenderResult {
    pub css: String,
    pub map: Option<SourceMap>,
}
