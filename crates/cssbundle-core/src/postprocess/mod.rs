/*
 * postprocess/mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Post-processing pipeline over the rendered stylesheet.
 */

//! Post-processing pipeline.
//!
//! The output of the dialect phase runs through [`TransformStage`]s in a
//! fixed order: import inlining, URL rewriting, vendor prefixing and
//! minification. [`PostProcessor::plan`] keeps only the enabled ones.
//!
//! Every stage returns a map from its own output to its input. The pipeline
//! composes it with the incoming map, so the final map always points at the
//! earliest sources known, and appends the `sourceMappingURL` annotation at
//! the end.

mod import;
pub(crate) mod lightning;
mod minify;
mod prefix;
mod url;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cssbundle_runtime::SystemRuntime;
use cssbundle_source_map::{SourceMap, SourceMapBuilder, annotation};

use crate::RenderResult;
use crate::config::{Autoprefixer, ImportsMode, SourcemapMode, UrlMode};
use crate::error::ProcessError;

pub use import::ImportStage;
pub use minify::MinifyStage;
pub use prefix::PrefixStage;
pub use url::UrlStage;

/// Browserslist query used when prefixing is on without a browser list.
pub const DEFAULT_BROWSERS: &str = "defaults";

/// The text and map a stage starts from.
#[derive(Debug, Clone, Default)]
pub struct StageInput {
    pub css: String,
    pub map: Option<SourceMap>,
}

/// Shared, read-only context of one pipeline run.
#[derive(Clone)]
pub struct StageContext {
    pub runtime: Arc<dyn SystemRuntime>,
    /// Final location of the stylesheet
    pub output_path: PathBuf,
    /// Extra directories searched for imports and assets
    pub include_paths: Vec<PathBuf>,
    pub url_mode: UrlMode,
    /// Mark inlined files with boundary comments
    pub comments: bool,
    pub sourcemap: SourcemapMode,
}

impl StageContext {
    /// File name of the output; stage maps name both ends after it.
    pub fn file_name(&self) -> String {
        self.output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn output_dir(&self) -> &Path {
        self.output_path.parent().unwrap_or(Path::new(""))
    }

    /// Whether stages should produce maps.
    pub fn maps(&self) -> bool {
        self.sourcemap.is_enabled()
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("output_path", &self.output_path)
            .field("include_paths", &self.include_paths)
            .field("url_mode", &self.url_mode)
            .field("comments", &self.comments)
            .field("sourcemap", &self.sourcemap)
            .finish_non_exhaustive()
    }
}

/// One CSS-to-CSS transformation.
#[async_trait]
pub trait TransformStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Transform `input`. When maps are on, the returned map describes
    /// `output -> input`, with the input named [`StageContext::file_name`].
    async fn run(
        &self,
        input: &StageInput,
        ctx: &StageContext,
    ) -> Result<RenderResult, ProcessError>;
}

/// Which stages a run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostProcessOptions {
    pub imports: ImportsMode,
    pub url_mode: UrlMode,
    pub autoprefixer: Autoprefixer,
    pub compress: bool,
}

impl PostProcessOptions {
    /// Browserslist queries for prefixing, if it is on.
    pub fn browsers(&self) -> Option<Vec<String>> {
        match &self.autoprefixer {
            Autoprefixer::Off => None,
            Autoprefixer::Default => Some(vec![DEFAULT_BROWSERS.to_string()]),
            Autoprefixer::Browsers(list) => Some(list.clone()),
        }
    }
}

/// An ordered list of enabled stages.
pub struct PostProcessor {
    stages: Vec<Box<dyn TransformStage>>,
}

impl PostProcessor {
    /// Assemble the enabled stages in their fixed order.
    pub fn plan(options: &PostProcessOptions) -> Self {
        let mut stages: Vec<Box<dyn TransformStage>> = Vec::new();
        if options.imports == ImportsMode::Include {
            stages.push(Box::new(ImportStage));
        }
        if options.url_mode.rewrites() {
            stages.push(Box::new(UrlStage));
        }
        let browsers = options.browsers();
        if let Some(browsers) = &browsers {
            stages.push(Box::new(PrefixStage::new(browsers.clone())));
        }
        if options.compress {
            stages.push(Box::new(MinifyStage::new(browsers)));
        }
        Self { stages }
    }

    /// A pipeline of exactly `stages`.
    pub fn with_stages(stages: Vec<Box<dyn TransformStage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage on `input`, then attach the map annotation.
    ///
    /// The first failing stage aborts the run; nothing partial is returned.
    pub async fn process(
        &self,
        input: RenderResult,
        ctx: &StageContext,
    ) -> Result<RenderResult, ProcessError> {
        let mut current = StageInput {
            css: input.css,
            map: input.map,
        };

        for stage in &self.stages {
            tracing::debug!(stage = stage.name(), bytes = current.css.len(), "Running stage");
            let output = stage.run(&current, ctx).await?;
            let map = match (output.map, current.map.take()) {
                (Some(stage_map), Some(previous)) => Some(stage_map.compose(&previous)),
                (stage_map, previous) => stage_map.or(previous),
            };
            current = StageInput {
                css: output.css,
                map,
            };
        }

        if !ctx.maps() {
            return Ok(RenderResult {
                css: current.css,
                map: None,
            });
        }

        let map = current
            .map
            .unwrap_or_else(|| SourceMap::new(ctx.file_name()));
        let url = match ctx.sourcemap {
            SourcemapMode::Inline => map
                .to_data_url()
                .map_err(|e| ProcessError::source_map("annotate", e))?,
            _ => format!("{}.map", ctx.file_name()),
        };

        let mut css = current.css;
        if !css.is_empty() && !css.ends_with('\n') {
            css.push('\n');
        }
        css.push_str(&annotation(&url));
        Ok(RenderResult {
            css,
            map: Some(map),
        })
    }
}

/// Output text built piece by piece, with a line-level map of where each
/// piece came from.
pub struct MappedOutput {
    css: String,
    builder: Option<SourceMapBuilder>,
    line: u32,
    column: u32,
}

impl MappedOutput {
    /// Start an output named `file`; no map is kept unless `mapped`.
    pub fn new(file: &str, mapped: bool) -> Self {
        Self {
            css: String::new(),
            builder: mapped.then(|| SourceMapBuilder::new(file)),
            line: 0,
            column: 0,
        }
    }

    /// Register a source, if a map is kept.
    pub fn add_source(&mut self, name: &str, content: Option<&str>) -> Option<u32> {
        self.builder.as_mut().map(|b| b.add_source(name, content))
    }

    /// Append `text`, which starts at `origin` (line, column) of `source`.
    ///
    /// Each non-blank line maps to the matching line of the source.
    pub fn push_mapped(&mut self, text: &str, source: Option<u32>, origin: (u32, u32)) {
        for (i, piece) in text.split_inclusive('\n').enumerate() {
            if let (Some(builder), Some(source)) = (self.builder.as_mut(), source) {
                if !piece.trim().is_empty() {
                    let column = if i == 0 { origin.1 } else { 0 };
                    builder.map_to(self.line, self.column, source, origin.0 + i as u32, column);
                }
            }
            self.advance(piece);
        }
    }

    /// Text written so far.
    pub fn as_str(&self) -> &str {
        &self.css
    }

    /// Append generated text with no origin.
    pub fn push_unmapped(&mut self, text: &str) {
        for piece in text.split_inclusive('\n') {
            self.advance(piece);
        }
    }

    fn advance(&mut self, piece: &str) {
        self.css.push_str(piece);
        if piece.ends_with('\n') {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += piece.chars().count() as u32;
        }
    }

    pub fn finish(self) -> RenderResult {
        let line_count = self.line as usize + 1;
        RenderResult {
            css: self.css,
            map: self.builder.map(|mut b| {
                b.ensure_lines(line_count);
                b.build()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cssbundle_runtime::MemoryRuntime;
    use cssbundle_source_map::identity_map;

    pub(crate) fn context(runtime: Arc<MemoryRuntime>, sourcemap: SourcemapMode) -> StageContext {
        StageContext {
            runtime,
            output_path: PathBuf::from("/project/bundle/bundle.css"),
            include_paths: Vec::new(),
            url_mode: UrlMode::Rebase,
            comments: false,
            sourcemap,
        }
    }

    fn options() -> PostProcessOptions {
        PostProcessOptions {
            imports: ImportsMode::Include,
            url_mode: UrlMode::Rebase,
            autoprefixer: Autoprefixer::Default,
            compress: true,
        }
    }

    #[test]
    fn test_plan_keeps_fixed_order() {
        let processor = PostProcessor::plan(&options());
        assert_eq!(processor.stage_names(), vec!["import", "url", "prefix", "minify"]);
    }

    #[test]
    fn test_plan_skips_disabled_stages() {
        let mut options = PostProcessOptions {
            imports: ImportsMode::Keep,
            url_mode: UrlMode::None,
            autoprefixer: Autoprefixer::Off,
            compress: true,
        };
        assert_eq!(PostProcessor::plan(&options).stage_names(), vec!["minify"]);

        options.compress = false;
        assert!(PostProcessor::plan(&options).is_empty());
    }

    struct Append(&'static str);

    #[async_trait]
    impl TransformStage for Append {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn run(
            &self,
            input: &StageInput,
            ctx: &StageContext,
        ) -> Result<RenderResult, ProcessError> {
            let css = format!("{}/* {} */\n", input.css, self.0);
            let file = ctx.file_name();
            let map = ctx.maps().then(|| identity_map(&file, &file, &css));
            Ok(RenderResult { css, map })
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let runtime = Arc::new(MemoryRuntime::new());
        let ctx = context(runtime, SourcemapMode::Off);
        let processor =
            PostProcessor::with_stages(vec![Box::new(Append("first")), Box::new(Append("second"))]);
        let result = processor
            .process(
                RenderResult {
                    css: "a{}\n".to_string(),
                    map: None,
                },
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result.css, "a{}\n/* first */\n/* second */\n");
        assert!(result.map.is_none());
    }

    #[tokio::test]
    async fn test_map_is_composed_and_annotated() {
        let runtime = Arc::new(MemoryRuntime::new());
        let ctx = context(runtime, SourcemapMode::File);
        let processor = PostProcessor::with_stages(vec![Box::new(Append("one"))]);
        let input = RenderResult {
            css: "a{}\n".to_string(),
            map: Some(identity_map("bundle.css", "../blocks/a.scss", "a{}\n")),
        };

        let result = processor.process(input, &ctx).await.unwrap();
        assert!(result.css.ends_with("\n/*# sourceMappingURL=bundle.css.map */"));
        let map = result.map.unwrap();
        assert_eq!(map.sources, vec!["../blocks/a.scss"]);
    }

    #[tokio::test]
    async fn test_inline_annotation() {
        let runtime = Arc::new(MemoryRuntime::new());
        let ctx = context(runtime, SourcemapMode::Inline);
        let processor = PostProcessor::with_stages(Vec::new());
        let result = processor
            .process(
                RenderResult {
                    css: "a{}".to_string(),
                    map: None,
                },
                &ctx,
            )
            .await
            .unwrap();
        assert!(
            result
                .css
                .starts_with("a{}\n/*# sourceMappingURL=data:application/json;base64,")
        );
    }

    #[test]
    fn test_mapped_output_lines() {
        let mut out = MappedOutput::new("bundle.css", true);
        let a = out.add_source("a.css", None);
        out.push_unmapped("/* a.css:begin */\n");
        out.push_mapped("a {}\nb {}\n", a, (3, 0));
        let result = out.finish();

        assert_eq!(result.css, "/* a.css:begin */\na {}\nb {}\n");
        let map = result.map.unwrap();
        assert!(map.lookup(0, 0).is_none());
        let b = map.lookup(2, 0).and_then(|s| s.original).unwrap();
        assert_eq!(b.line, 4);
    }
}
