/*
 * build.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Build command implementation
 */

//! Build command implementation.
//!
//! `cssbundle build <unit.toml>` builds one unit described as:
//!
//! ```toml
//! name = "index"
//! root = "."                      # relative to the unit file
//! files = ["blocks/a.scss", "blocks/a.css"]
//!
//! [config]
//! target = "bundle/?.css"
//! sourcemap = true
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use cssbundle_core::{
    BuildArtifact, BuildInput, CacheStore, SourcemapMode, StylesheetTech, TechConfig,
};
use cssbundle_runtime::{NativeRuntime, SystemRuntime};

/// Default cache directory, relative to the unit root.
const CACHE_DIR: &str = ".cssbundle";

/// Arguments for the build command
#[derive(Debug)]
pub struct BuildArgs {
    /// Path to the build unit TOML file
    pub unit: String,
    pub cache_dir: Option<String>,
    pub stdout: bool,
}

/// A build unit as written in TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildUnit {
    pub name: String,
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Source files in build order
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub config: TechConfig,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl BuildUnit {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid build unit")
    }

    /// Root of the unit, resolved against the directory of the unit file.
    pub fn resolved_root(&self, unit_file: &Path) -> PathBuf {
        if self.root.is_absolute() {
            return self.root.clone();
        }
        unit_file
            .parent()
            .unwrap_or(Path::new(""))
            .join(&self.root)
    }

    /// The unit as built for `--stdout`: a map file would land next to a
    /// stylesheet that is never written, so the map is inlined instead.
    pub fn for_stdout(mut self) -> Self {
        if self.config.sourcemap == SourcemapMode::File {
            debug!(unit = %self.name, "Inlining the source map for stdout");
            self.config.sourcemap = SourcemapMode::Inline;
        }
        self
    }
}

/// Execute the build command
pub fn execute(args: BuildArgs) -> Result<()> {
    let unit_path = PathBuf::from(&args.unit);
    let text = std::fs::read_to_string(&unit_path)
        .with_context(|| format!("Failed to read build unit {}", unit_path.display()))?;
    let mut unit = BuildUnit::parse(&text)?;
    if args.stdout {
        unit = unit.for_stdout();
    }

    let root = unit.resolved_root(&unit_path);
    let cache_dir = args
        .cache_dir
        .as_ref()
        .map_or_else(|| root.join(CACHE_DIR), PathBuf::from);
    debug!(unit = %unit.name, root = %root.display(), "Loaded build unit");

    let runtime = tokio::runtime::Runtime::new()?;
    let artifact = runtime.block_on(build_unit(&unit, &root, &cache_dir))?;

    if args.stdout {
        info!(
            unit = %unit.name,
            globals_changed = artifact.globals_changed,
            "Built stylesheet"
        );
        print!("{}", artifact.css);
        return Ok(());
    }

    NativeRuntime::new()
        .file_write(&artifact.output_path, artifact.css.as_bytes())
        .with_context(|| format!("Failed to write {}", artifact.output_path.display()))?;
    info!(
        output = %artifact.output_path.display(),
        globals_changed = artifact.globals_changed,
        "Wrote stylesheet"
    );
    Ok(())
}

/// Build `unit` rooted at `root`, keeping the globals cache in `cache_dir`.
pub async fn build_unit(unit: &BuildUnit, root: &Path, cache_dir: &Path) -> Result<BuildArtifact> {
    let runtime: Arc<dyn SystemRuntime> = Arc::new(NativeRuntime::new());
    let input = BuildInput::from_paths(
        &unit.name,
        root,
        unit.files.as_slice(),
        &unit.config.suffixes,
    );
    let tech = StylesheetTech::new(runtime.clone(), unit.config.clone())
        .with_cache(CacheStore::new(runtime, cache_dir));
    let artifact = tech
        .build(&input)
        .await
        .with_context(|| format!("Failed to build unit {}", unit.name))?;
    Ok(artifact)
}
