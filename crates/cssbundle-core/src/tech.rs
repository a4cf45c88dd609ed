/*
 * tech.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The stylesheet tech: one build of one unit.
 */

//! Tech orchestrator.
//!
//! [`StylesheetTech::build`] runs the whole stage for a build unit:
//!
//! 1. validate the configuration and capture the globals state,
//! 2. build the import document,
//! 3. render it with the dialect engine,
//! 4. post-process the result,
//! 5. write the source map,
//! 6. record the globals state for the next build.
//!
//! The first failure is returned as is; nothing is persisted after it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cssbundle_runtime::SystemRuntime;
use cssbundle_source_map::SourceMap;

use crate::cache::{CacheStore, GlobalsState, needs_rebuild};
use crate::config::{SourcemapMode, TechConfig};
use crate::dialect::{DialectCompiler, DialectEngine, DialectOptions, DialectPlugin};
use crate::error::TechError;
use crate::imports::{ImportOptions, build_import_document};
use crate::map_writer::write_map;
use crate::postprocess::{PostProcessOptions, PostProcessor, StageContext};
use crate::source::{SourceFile, normalize};

/// The sources of one build unit.
#[derive(Debug, Clone)]
pub struct BuildInput {
    /// Unit name, substituted for `?` in the target
    pub unit: String,
    pub root: PathBuf,
    /// Ordered source files; may hold several files per base name
    pub files: Vec<SourceFile>,
}

impl BuildInput {
    /// Describe `paths` (relative to `root` or absolute) with `suffixes`.
    pub fn from_paths<P: AsRef<Path>>(
        unit: impl Into<String>,
        root: impl Into<PathBuf>,
        paths: &[P],
        suffixes: &[String],
    ) -> Self {
        let root = root.into();
        let files = paths
            .iter()
            .map(|p| SourceFile::resolve(&root, p.as_ref(), suffixes))
            .collect();
        Self {
            unit: unit.into(),
            root,
            files,
        }
    }
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    /// Final stylesheet text, annotation included
    pub css: String,
    pub map: Option<SourceMap>,
    pub output_path: PathBuf,
    /// Where the map was written, for [`SourcemapMode::File`]
    pub map_path: Option<PathBuf>,
    /// Whether the globals changed since the last recorded build. The build
    /// always runs; callers use this to invalidate what depends on the unit.
    pub globals_changed: bool,
}

/// Builds stylesheets for build units sharing one configuration.
pub struct StylesheetTech {
    runtime: Arc<dyn SystemRuntime>,
    config: TechConfig,
    compiler: DialectCompiler,
    plugins: Vec<Arc<dyn DialectPlugin>>,
    cache: Option<CacheStore>,
}

impl StylesheetTech {
    /// A tech rendering with grass and no globals cache.
    pub fn new(runtime: Arc<dyn SystemRuntime>, config: TechConfig) -> Self {
        Self {
            compiler: DialectCompiler::grass(runtime.clone()),
            runtime,
            config,
            plugins: Vec::new(),
            cache: None,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn DialectEngine>) -> Self {
        self.compiler = DialectCompiler::new(engine, self.runtime.clone());
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn DialectPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Record globals fingerprints in `cache` between builds.
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &TechConfig {
        &self.config
    }

    /// Absolute output path for `input`.
    pub fn output_path(&self, input: &BuildInput) -> PathBuf {
        normalize(&input.root.join(self.config.target_for(&input.unit)))
    }

    pub async fn build(&self, input: &BuildInput) -> Result<BuildArtifact, TechError> {
        let config = &self.config;
        config.validate()?;

        let runtime = self.runtime.as_ref();
        let output_path = self.output_path(input);
        let output_dir = output_path.parent().unwrap_or(Path::new("")).to_path_buf();
        let include_paths: Vec<PathBuf> = config
            .includes
            .iter()
            .map(|p| normalize(&input.root.join(p)))
            .collect();

        let globals = GlobalsState::capture(runtime, &input.root, &config.globals)?;
        let previous = self.cache.as_ref().and_then(|c| c.load(&input.unit));
        let globals_changed = needs_rebuild(previous.as_ref(), &globals);
        tracing::debug!(unit = %input.unit, globals_changed, "Checked globals");

        let document = build_import_document(
            &input.files,
            &config.globals,
            &ImportOptions {
                root: &input.root,
                output_dir: &output_dir,
                comments: config.comments,
                suffixes: &config.suffixes,
                unknown_suffix: config.unknown_suffix,
            },
        )?;
        tracing::debug!(
            unit = %input.unit,
            entries = document.entries.len(),
            "Built import document"
        );

        runtime.dir_create(&output_dir, true)?;

        let dialect_options = DialectOptions {
            compress: config.compress,
            class_prefix: config.prefix.clone(),
            sourcemap: config.sourcemap,
            url_mode: config.url,
            include_paths: include_paths.clone(),
            variables: config.variable_bindings(),
            plugins: self.plugins.clone(),
            use_kit: config.use_kit,
            hoist: config.hoist,
            ..DialectOptions::new(output_path.clone())
        };
        let rendered = self.compiler.compile(&document, &dialect_options).await?;

        let processor = PostProcessor::plan(&PostProcessOptions {
            imports: config.imports,
            url_mode: config.url,
            autoprefixer: config.autoprefixer.clone(),
            compress: config.compress,
        });
        let ctx = StageContext {
            runtime: self.runtime.clone(),
            output_path: output_path.clone(),
            include_paths,
            url_mode: config.url,
            comments: config.comments,
            sourcemap: config.sourcemap,
        };
        let result = processor.process(rendered, &ctx).await?;

        let map_path = (config.sourcemap == SourcemapMode::File).then(|| map_path_for(&output_path));
        if let (Some(map), Some(path)) = (&result.map, &map_path) {
            write_map(runtime, path, map, config.sourcemap)?;
        }

        if let Some(cache) = &self.cache {
            cache.store(&input.unit, &globals)?;
        }

        tracing::info!(
            unit = %input.unit,
            bytes = result.css.len(),
            sourcemap = ?config.sourcemap,
            "Built stylesheet"
        );

        Ok(BuildArtifact {
            css: result.css,
            map: result.map,
            output_path,
            map_path,
            globals_changed,
        })
    }
}

/// `<output>.map`, next to the stylesheet.
pub fn map_path_for(output_path: &Path) -> PathBuf {
    let mut path = OsString::from(output_path.as_os_str());
    path.push(".map");
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use cssbundle_runtime::MemoryRuntime;

    #[test]
    fn test_map_path_appends_suffix() {
        assert_eq!(
            map_path_for(Path::new("/p/bundle/bundle.css")),
            PathBuf::from("/p/bundle/bundle.css.map")
        );
    }

    #[test]
    fn test_output_path_substitutes_unit() {
        let tech = StylesheetTech::new(
            Arc::new(MemoryRuntime::new()),
            TechConfig {
                target: "bundle/?.css".to_string(),
                ..TechConfig::default()
            },
        );
        let input = BuildInput::from_paths::<&str>("index", "/project", &[], &[]);
        assert_eq!(tech.output_path(&input), PathBuf::from("/project/bundle/index.css"));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_first() {
        let tech = StylesheetTech::new(
            Arc::new(MemoryRuntime::new()),
            TechConfig {
                suffixes: Vec::new(),
                ..TechConfig::default()
            },
        );
        let input = BuildInput::from_paths::<&str>("index", "/project", &[], &[]);
        let err = tech.build(&input).await.unwrap_err();
        assert!(matches!(err, TechError::Config(ConfigError::EmptySuffixes)));
    }

    #[tokio::test]
    async fn test_empty_unit_builds_empty_stylesheet() {
        let runtime = Arc::new(MemoryRuntime::new());
        let tech = StylesheetTech::new(runtime, TechConfig::default());
        let input = BuildInput::from_paths::<&str>("index", "/project", &[], &[]);
        let artifact = tech.build(&input).await.unwrap();
        assert_eq!(artifact.css, "");
        assert!(artifact.map.is_none());
        assert!(artifact.globals_changed);
    }
}
