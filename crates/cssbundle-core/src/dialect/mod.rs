/*
 * dialect/mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Dialect compiler adapter.
 */

//! Dialect compiler adapter.
//!
//! [`DialectCompiler`] renders an [`ImportDocument`] with a
//! [`DialectEngine`] and turns the engine's output into a [`RenderResult`]:
//! URLs rewritten per originating file, boundary comments restored and,
//! when asked for, a source map. Class prefixing and at-rule hoisting then
//! run as one lightningcss pass over the whole stylesheet.
//!
//! When none of that needs to know where output text came from, the document
//! is rendered directly. Otherwise the engine runs with a
//! [`trace::FileTracer`] and always in expanded style; compression is left
//! to the post-processing minifier.

pub mod grass_engine;
pub mod kit;
pub mod trace;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cssbundle_runtime::SystemRuntime;
use cssbundle_source_map::SourceMap;

use crate::RenderResult;
use crate::config::{SourcemapMode, UrlMode};
use crate::error::{CompileError, DialectError};
use crate::imports::{ImportDocument, begin_marker, end_marker, import_directive};
use crate::postprocess::lightning::{self, Pass};
use crate::source::{Dialect, normalize};
use crate::url::UrlResolver;

pub use grass_engine::GrassEngine;
use trace::{FileTracer, LoadedFile, Part, Span};

/// What the engine needs besides the source text.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    /// Where the source is treated as living; relative imports resolve from
    /// its directory
    pub input_path: &'a Path,
    pub load_paths: &'a [PathBuf],
    pub compressed: bool,
    /// Mount the bundled kit
    pub use_kit: bool,
    /// Wrap every loaded file in trace markers
    pub tracer: Option<&'a FileTracer>,
}

/// A preprocessor able to render SCSS source.
#[async_trait]
pub trait DialectEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn render(
        &self,
        source: &str,
        request: &RenderRequest<'_>,
    ) -> Result<String, CompileError>;
}

/// Contributions of plugins and variables to a render.
#[derive(Debug, Clone, Default)]
pub struct DialectSetup {
    variables: Vec<(String, String)>,
    preludes: Vec<String>,
    include_paths: Vec<PathBuf>,
}

impl DialectSetup {
    /// Declare a global variable; a later definition of the same name wins.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.push((name.into(), value.into()));
    }

    /// Add source rendered ahead of every import.
    pub fn add_prelude(&mut self, source: impl Into<String>) {
        self.preludes.push(source.into());
    }

    pub fn add_include_path(&mut self, path: impl Into<PathBuf>) {
        self.include_paths.push(path.into());
    }

    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    /// Variable declarations followed by plugin preludes.
    pub fn prelude(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.variables {
            out.push_str(&format!("${name}: {value};\n"));
        }
        for prelude in &self.preludes {
            out.push_str(prelude);
            if !prelude.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

/// Extends the dialect setup of every build, in the order supplied.
pub trait DialectPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn configure(&self, setup: &mut DialectSetup);
}

/// Options of [`DialectCompiler::compile`].
#[derive(Clone)]
pub struct DialectOptions {
    /// Final location of the stylesheet
    pub output_path: PathBuf,
    /// Compress when rendering directly; traced renders defer to the minifier
    pub compress: bool,
    pub class_prefix: String,
    pub sourcemap: SourcemapMode,
    pub url_mode: UrlMode,
    pub include_paths: Vec<PathBuf>,
    pub variables: Vec<(String, String)>,
    pub plugins: Vec<Arc<dyn DialectPlugin>>,
    pub use_kit: bool,
    pub hoist: bool,
}

impl DialectOptions {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            compress: false,
            class_prefix: String::new(),
            sourcemap: SourcemapMode::Off,
            url_mode: UrlMode::Rebase,
            include_paths: Vec::new(),
            variables: Vec::new(),
            plugins: Vec::new(),
            use_kit: false,
            hoist: false,
        }
    }

    fn output_file_name(&self) -> String {
        self.output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for DialectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialectOptions")
            .field("output_path", &self.output_path)
            .field("compress", &self.compress)
            .field("class_prefix", &self.class_prefix)
            .field("sourcemap", &self.sourcemap)
            .field("url_mode", &self.url_mode)
            .field("include_paths", &self.include_paths)
            .field("variables", &self.variables)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("use_kit", &self.use_kit)
            .field("hoist", &self.hoist)
            .finish()
    }
}

/// Renders import documents with a [`DialectEngine`].
#[derive(Clone)]
pub struct DialectCompiler {
    engine: Arc<dyn DialectEngine>,
    runtime: Arc<dyn SystemRuntime>,
}

impl DialectCompiler {
    pub fn new(engine: Arc<dyn DialectEngine>, runtime: Arc<dyn SystemRuntime>) -> Self {
        Self { engine, runtime }
    }

    /// A compiler using [`GrassEngine`] on `runtime`.
    pub fn grass(runtime: Arc<dyn SystemRuntime>) -> Self {
        Self::new(Arc::new(GrassEngine::new(runtime.clone())), runtime)
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Whether rendering `document` with `options` needs output attribution.
    pub fn needs_trace(document: &ImportDocument, options: &DialectOptions) -> bool {
        options.url_mode.rewrites()
            || options.sourcemap.is_enabled()
            || document.comments
            || document.entries.iter().any(|e| e.dialect == Dialect::Plain)
    }

    pub async fn compile(
        &self,
        document: &ImportDocument,
        options: &DialectOptions,
    ) -> Result<RenderResult, DialectError> {
        if document.is_empty() {
            return Ok(RenderResult {
                css: String::new(),
                map: options
                    .sourcemap
                    .is_enabled()
                    .then(|| SourceMap::new(options.output_file_name())),
            });
        }

        let mut setup = DialectSetup::default();
        for (name, value) in &options.variables {
            setup.define(name, value);
        }
        for plugin in &options.plugins {
            tracing::debug!(plugin = plugin.name(), "Configuring dialect plugin");
            plugin.configure(&mut setup);
        }
        let mut load_paths = options.include_paths.clone();
        load_paths.extend(setup.include_paths().iter().cloned());

        let mut source = setup.prelude();
        if options.use_kit {
            source.push_str(&kit::kit_import());
            source.push('\n');
        }

        if !Self::needs_trace(document, options) {
            source.push_str(&document.to_source());
            let request = RenderRequest {
                input_path: &options.output_path,
                load_paths: &load_paths,
                compressed: options.compress,
                use_kit: options.use_kit,
                tracer: None,
            };
            tracing::debug!(engine = self.engine.name(), "Rendering import document");
            let css = self.engine.render(&source, &request).await?;
            return rewrite_rules(RenderResult { css, map: None }, options);
        }

        for (index, entry) in document.entries.iter().enumerate() {
            match entry.dialect {
                Dialect::Preprocessor => {
                    source.push_str(&import_directive(&entry.url));
                    source.push('\n');
                }
                Dialect::Plain => source.push_str(&trace::placeholder(index)),
            }
        }

        let tracer = FileTracer::new(
            options
                .url_mode
                .rewrites()
                .then(|| options.output_path.clone()),
        );
        let request = RenderRequest {
            input_path: &options.output_path,
            load_paths: &load_paths,
            compressed: false,
            use_kit: options.use_kit,
            tracer: Some(&tracer),
        };
        tracing::debug!(engine = self.engine.name(), "Rendering traced import document");
        let css = self.engine.render(&source, &request).await?;
        let files = tracer.into_files();

        let resolver = UrlResolver::new(self.runtime.as_ref(), &load_paths);
        let assembled = assemble(&css, document, &files, options, resolver)?;
        rewrite_rules(assembled, options)
    }
}

fn assemble(
    css: &str,
    document: &ImportDocument,
    files: &[LoadedFile],
    options: &DialectOptions,
    resolver: UrlResolver<'_>,
) -> Result<RenderResult, DialectError> {
    let entry_urls: HashMap<PathBuf, &str> = document
        .preprocessor_entries()
        .map(|e| (normalize(&e.full_path), e.url.as_str()))
        .collect();
    let top_level_url = |file: usize| {
        files
            .get(file)
            .and_then(|f| entry_urls.get(&f.path))
            .copied()
    };

    let mut body = String::with_capacity(css.len());
    let mut spans = Vec::new();

    for part in trace::split(css) {
        match part {
            Part::Text { text, origin } => {
                let from = origin
                    .and_then(|i| files.get(i))
                    .map_or(options.output_path.as_path(), |f| f.path.as_path());
                let text = resolver.rewrite(text, options.url_mode, from, &options.output_path)?;
                let start = body.len();
                body.push_str(&text);
                spans.push(Span {
                    start,
                    end: body.len(),
                    origin,
                });
            }
            Part::Begin { file, depth: 0 } if document.comments => {
                if let Some(url) = top_level_url(file) {
                    body.push_str(&begin_marker(url));
                    body.push('\n');
                }
            }
            Part::End { file, depth: 0 } if document.comments => {
                if let Some(url) = top_level_url(file) {
                    body.push_str(&end_marker(url));
                    body.push('\n');
                }
            }
            Part::Plain(index) => {
                if let Some(entry) = document.entries.get(index) {
                    body.push_str(&import_directive(&entry.url));
                    body.push('\n');
                }
            }
            Part::Begin { .. } | Part::End { .. } => {}
        }
    }

    let map = options
        .sourcemap
        .is_enabled()
        .then(|| trace::locate_map(&body, &spans, files, &options.output_path));

    Ok(RenderResult { css: body, map })
}

/// Prefix classes and hoist at-rules of the rendered stylesheet.
///
/// The rewrite reprints the stylesheet, so its map is composed onto the
/// incoming one. Untraced output keeps the engine's compression.
fn rewrite_rules(
    result: RenderResult,
    options: &DialectOptions,
) -> Result<RenderResult, DialectError> {
    if options.class_prefix.is_empty() && !options.hoist {
        return Ok(result);
    }
    let pass = Pass {
        minify: options.compress && result.map.is_none(),
        class_prefix: &options.class_prefix,
        hoist: options.hoist,
        ..Pass::default()
    };
    let file = options.output_file_name();
    let rewritten = lightning::run("rules", &result.css, &file, result.map.is_some(), pass)?;
    let map = match (rewritten.map, result.map) {
        (Some(rewrite_map), Some(previous)) => Some(rewrite_map.compose(&previous)),
        (_, previous) => previous,
    };
    Ok(RenderResult {
        css: rewritten.css,
        map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::ImportEntry;
    use cssbundle_runtime::MemoryRuntime;

    fn entry(path: &str, url: &str, dialect: Dialect) -> ImportEntry {
        ImportEntry {
            full_path: PathBuf::from(path),
            url: url.to_string(),
            dialect,
            global: false,
        }
    }

    fn compiler(runtime: Arc<MemoryRuntime>) -> DialectCompiler {
        DialectCompiler::grass(runtime)
    }

    fn normalized(css: &str) -> String {
        css.split_whitespace().collect::<Vec<_>>().join("")
    }

    #[test]
    fn test_setup_prelude_order() {
        let mut setup = DialectSetup::default();
        setup.define("a", "1");
        setup.add_prelude("@function f() { @return 1; }");
        setup.define("b", "\"x\"");
        assert_eq!(
            setup.prelude(),
            "$a: 1;\n$b: \"x\";\n@function f() { @return 1; }\n"
        );
    }

    #[tokio::test]
    async fn test_empty_document_gives_empty_output() {
        let runtime = Arc::new(MemoryRuntime::new());
        let mut options = DialectOptions::new("/project/bundle/bundle.css");
        options.sourcemap = SourcemapMode::File;
        let result = compiler(runtime)
            .compile(&ImportDocument::default(), &options)
            .await
            .unwrap();
        assert_eq!(result.css, "");
        assert!(result.map.is_some_and(|m| m.sources.is_empty()));
    }

    #[tokio::test]
    async fn test_variables_reach_sources() {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.add_file("/project/blocks/a.scss", ".a { width: $size; }");
        let document = ImportDocument {
            entries: vec![entry("/project/blocks/a.scss", "../blocks/a.scss", Dialect::Preprocessor)],
            comments: false,
        };
        let mut options = DialectOptions::new("/project/bundle/bundle.css");
        options.url_mode = UrlMode::None;
        options.variables = vec![("size".to_string(), "10px".to_string())];

        let result = compiler(runtime).compile(&document, &options).await.unwrap();
        assert_eq!(normalized(&result.css), ".a{width:10px;}");
    }

    #[tokio::test]
    async fn test_plugin_contributes_prelude() {
        struct Theme;
        impl DialectPlugin for Theme {
            fn name(&self) -> &str {
                "theme"
            }
            fn configure(&self, setup: &mut DialectSetup) {
                setup.define("accent", "blue");
            }
        }

        let runtime = Arc::new(MemoryRuntime::new());
        runtime.add_file("/project/blocks/a.scss", ".a { color: $accent; }");
        let document = ImportDocument {
            entries: vec![entry("/project/blocks/a.scss", "../blocks/a.scss", Dialect::Preprocessor)],
            comments: false,
        };
        let mut options = DialectOptions::new("/project/bundle/bundle.css");
        options.url_mode = UrlMode::None;
        options.plugins = vec![Arc::new(Theme)];

        let result = compiler(runtime).compile(&document, &options).await.unwrap();
        assert_eq!(normalized(&result.css), ".a{color:blue;}");
    }

    #[tokio::test]
    async fn test_urls_are_rebased_per_file() {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.add_file("/project/blocks/a.scss", "@import \"nested/b\";\n.a { background: url(a.png); }");
        runtime.add_file("/project/blocks/nested/_b.scss", ".b { background: url(b.png); }");
        let document = ImportDocument {
            entries: vec![entry("/project/blocks/a.scss", "../blocks/a.scss", Dialect::Preprocessor)],
            comments: false,
        };
        let options = DialectOptions::new("/project/bundle/bundle.css");

        let result = compiler(runtime).compile(&document, &options).await.unwrap();
        let css = normalized(&result.css);
        assert!(css.contains(".b{background:url(../blocks/nested/b.png);}"), "{css}");
        assert!(css.contains(".a{background:url(../blocks/a.png);}"), "{css}");
        assert!(!result.css.contains("cssbundle-trace"));
    }

    #[tokio::test]
    async fn test_comments_mark_top_level_files() {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.add_file("/project/blocks/a.scss", ".a { top: 0; }");
        let document = ImportDocument {
            entries: vec![
                entry("/project/blocks/a.scss", "../blocks/a.scss", Dialect::Preprocessor),
                entry("/project/plugins/p.css", "../plugins/p.css", Dialect::Plain),
            ],
            comments: true,
        };
        let options = DialectOptions::new("/project/bundle/bundle.css");

        let result = compiler(runtime).compile(&document, &options).await.unwrap();
        let css = &result.css;
        let begin = css.find("/* ../blocks/a.scss:begin */").unwrap();
        let rule = css.find(".a {").unwrap();
        let end = css.find("/* ../blocks/a.scss:end */").unwrap();
        let plain = css.find("@import \"../plugins/p.css\";").unwrap();
        assert!(begin < rule && rule < end && end < plain, "{css}");
    }

    #[tokio::test]
    async fn test_class_prefix_and_hoist() {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.add_file("/project/blocks/a.scss", ".a { top: 0; }");
        let document = ImportDocument {
            entries: vec![
                entry("/project/blocks/a.scss", "../blocks/a.scss", Dialect::Preprocessor),
                entry("/project/plugins/p.css", "../plugins/p.css", Dialect::Plain),
            ],
            comments: false,
        };
        let mut options = DialectOptions::new("/project/bundle/bundle.css");
        options.class_prefix = "x-".to_string();
        options.hoist = true;

        let result = compiler(runtime).compile(&document, &options).await.unwrap();
        assert!(result.css.starts_with("@import \"../plugins/p.css\";\n"), "{}", result.css);
        assert!(result.css.contains(".x-a {"));
    }

    #[tokio::test]
    async fn test_map_points_at_sources() {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.add_file("/project/blocks/a.scss", ".a {\n  color: red;\n}\n");
        runtime.add_file("/project/blocks/b.scss", ".b {\n  color: blue;\n}\n");
        let document = ImportDocument {
            entries: vec![
                entry("/project/blocks/a.scss", "../blocks/a.scss", Dialect::Preprocessor),
                entry("/project/blocks/b.scss", "../blocks/b.scss", Dialect::Preprocessor),
            ],
            comments: false,
        };
        let mut options = DialectOptions::new("/project/bundle/bundle.css");
        options.sourcemap = SourcemapMode::File;

        let result = compiler(runtime).compile(&document, &options).await.unwrap();
        let map = result.map.unwrap();
        assert_eq!(map.file.as_deref(), Some("bundle.css"));
        assert_eq!(map.sources, vec!["../blocks/a.scss", "../blocks/b.scss"]);
        assert_eq!(map.sources_content[1].as_deref(), Some(".b {\n  color: blue;\n}\n"));

        let b_line = result.css.lines().position(|l| l.starts_with(".b")).unwrap() as u32;
        let origin = map.lookup(b_line, 0).and_then(|s| s.original).unwrap();
        assert_eq!(map.sources[origin.source as usize], "../blocks/b.scss");
        assert_eq!(origin.line, 0);
    }

    #[tokio::test]
    async fn test_compile_error_names_file() {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.add_file("/project/blocks/a.scss", ".a {\n  color: $missing;\n}\n");
        let document = ImportDocument {
            entries: vec![entry("/project/blocks/a.scss", "../blocks/a.scss", Dialect::Preprocessor)],
            comments: false,
        };
        let options = DialectOptions::new("/project/bundle/bundle.css");

        let err = compiler(runtime).compile(&document, &options).await.unwrap_err();
        let DialectError::Compile(err) = err else {
            panic!("expected compile error, got {err:?}");
        };
        assert!(err.message.contains("Undefined variable"));
        assert_eq!(err.file, "/project/blocks/a.scss");
        assert_eq!((err.line, err.column), (2, 10));
    }

    #[tokio::test]
    async fn test_prefixed_output_keeps_markers_and_map() {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.add_file("/project/blocks/a.scss", ".a {\n  color: red;\n}\n");
        runtime.add_file("/project/blocks/b.scss", ".b {\n  color: blue;\n}\n");
        let document = ImportDocument {
            entries: vec![
                entry("/project/blocks/a.scss", "../blocks/a.scss", Dialect::Preprocessor),
                entry("/project/blocks/b.scss", "../blocks/b.scss", Dialect::Preprocessor),
            ],
            comments: true,
        };
        let mut options = DialectOptions::new("/project/bundle/bundle.css");
        options.sourcemap = SourcemapMode::File;
        options.class_prefix = "x-".to_string();

        let result = compiler(runtime).compile(&document, &options).await.unwrap();
        let css = &result.css;
        let begin = css.find("/* ../blocks/b.scss:begin */").unwrap();
        let rule = css.find(".x-b {").unwrap();
        assert!(begin < rule, "{css}");

        let map = result.map.unwrap();
        let b_line = css.lines().position(|l| l.starts_with(".x-b")).unwrap() as u32;
        let origin = map.lookup(b_line, 0).and_then(|s| s.original).unwrap();
        assert_eq!(map.sources[origin.source as usize], "../blocks/b.scss");
    }
}
