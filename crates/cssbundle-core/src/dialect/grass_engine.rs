/*
 * dialect/grass_engine.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * SCSS rendering with grass.
 */

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cssbundle_runtime::{RuntimeError, RuntimeFs, SystemRuntime, compile_scss_with_fs};
use once_cell::sync::Lazy;
use regex::Regex;

use super::kit::Kit;
use super::trace::TracingFs;
use super::{DialectEngine, RenderRequest};
use crate::error::CompileError;
use crate::source::normalize;

/// Closing frame of a grass diagnostic, e.g. `./../a.scss:3:10`.
static FRAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\./(.+):(\d+):(\d+)[ \t]*$").unwrap());

/// The same frame with unicode output turned off, e.g. `  ../a.scss 3:10  root stylesheet`.
static ASCII_FRAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(\S.*?)[ \t]+(\d+):(\d+)[ \t]+root stylesheet[ \t]*$").unwrap()
});

/// File name grass gives to string input.
const STRING_INPUT: &str = "stdin";

/// [`DialectEngine`] backed by the grass SCSS compiler.
pub struct GrassEngine {
    runtime: Arc<dyn SystemRuntime>,
    kit: Kit,
}

impl GrassEngine {
    pub fn new(runtime: Arc<dyn SystemRuntime>) -> Self {
        Self {
            runtime,
            kit: Kit::new(),
        }
    }

    fn render_blocking(
        &self,
        source: &str,
        request: &RenderRequest<'_>,
    ) -> Result<String, CompileError> {
        let runtime = self.runtime.as_ref();
        let fs = if request.use_kit {
            RuntimeFs::with_embedded(runtime, &self.kit)
        } else {
            RuntimeFs::new(runtime)
        };

        let result = match request.tracer {
            Some(tracer) => {
                let traced = TracingFs::new(&fs, tracer);
                compile_scss_with_fs(
                    &traced,
                    source,
                    request.input_path,
                    request.load_paths,
                    request.compressed,
                )
            }
            None => compile_scss_with_fs(
                &fs,
                source,
                request.input_path,
                request.load_paths,
                request.compressed,
            ),
        };

        result.map_err(|e| match e {
            RuntimeError::SassError(message) => {
                parse_diagnostic(&message, request.input_path, request.tracer.is_some())
            }
            other => CompileError::new(request.input_path.display().to_string(), other.to_string()),
        })
    }
}

#[async_trait]
impl DialectEngine for GrassEngine {
    fn name(&self) -> &str {
        "grass"
    }

    async fn render(
        &self,
        source: &str,
        request: &RenderRequest<'_>,
    ) -> Result<String, CompileError> {
        self.render_blocking(source, request)
    }
}

/// Turn a grass diagnostic into a [`CompileError`].
///
/// A location inside the compiled entry is reported against `input_path`.
/// Traced files carry one extra leading line, which is taken off the
/// reported line number.
pub fn parse_diagnostic(message: &str, input_path: &Path, traced: bool) -> CompileError {
    let summary = message
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or(message);
    let summary = summary.strip_prefix("Error: ").unwrap_or(summary).to_string();

    let caps = FRAME_RE
        .captures_iter(message)
        .last()
        .or_else(|| ASCII_FRAME_RE.captures_iter(message).last());
    let Some(caps) = caps else {
        return CompileError::new(input_path.display().to_string(), summary);
    };

    let file = caps[1].trim();
    let mut line: u32 = caps[2].parse().unwrap_or(0);
    let column: u32 = caps[3].parse().unwrap_or(0);

    let located = normalize(Path::new(file));
    let file = if file == STRING_INPUT || located == normalize(input_path) {
        input_path.display().to_string()
    } else {
        if traced && line > 1 {
            line -= 1;
        }
        located.display().to_string()
    };

    CompileError {
        file,
        line,
        column,
        message: summary,
    }
}
