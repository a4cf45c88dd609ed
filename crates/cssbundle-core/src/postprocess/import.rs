/*
 * postprocess/import.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Inlining of plain CSS @import rules.
 */

//! Import inlining.
//!
//! Every top-level `@import` left after the dialect phase is replaced by the
//! content of the file it names, recursively. Rules carrying a media query
//! or naming an absolute URL stay in place. Each file is inlined at most
//! once per run; a file importing one of its own importers is an error.

use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cssbundle_source_map::LineIndex;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{MappedOutput, StageContext, StageInput, TransformStage};
use crate::RenderResult;
use crate::config::UrlMode;
use crate::error::{ImportResolutionError, ProcessError};
use crate::imports::{begin_marker, end_marker};
use crate::source::{normalize, relative_path};
use crate::statements::find_statements;
use crate::url::{UrlResolver, is_absolute_url, rebase_imports};

/// Prelude of an `@import`: a string or `url(...)` target, then media.
static PRELUDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)^(?:url\(\s*(?:"([^"]*)"|'([^']*)'|([^)\s]*))\s*\)|"([^"]*)"|'([^']*)')\s*(.*)$"#,
    )
    .unwrap()
});

/// Target and media query of an `@import` prelude.
fn parse_prelude(prelude: &str) -> Option<(&str, &str)> {
    let caps = PRELUDE_RE.captures(prelude)?;
    let target = (1..=5).find_map(|i| caps.get(i))?.as_str();
    let media = caps.get(6).map_or("", |m| m.as_str().trim());
    Some((target, media))
}

/// Inlines plain `@import` rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportStage;

#[async_trait]
impl TransformStage for ImportStage {
    fn name(&self) -> &'static str {
        "import"
    }

    async fn run(
        &self,
        input: &StageInput,
        ctx: &StageContext,
    ) -> Result<RenderResult, ProcessError> {
        let file = ctx.file_name();
        let mut inliner = Inliner {
            ctx,
            resolver: UrlResolver::new(ctx.runtime.as_ref(), &ctx.include_paths),
            out: MappedOutput::new(&file, ctx.maps()),
            stack: vec![ctx.output_path.clone()],
            inlined: HashSet::new(),
        };
        let source = inliner.out.add_source(&file, None);
        inliner.expand(&input.css, &ctx.output_path, source, true)?;
        Ok(inliner.out.finish())
    }
}

struct Inliner<'a> {
    ctx: &'a StageContext,
    resolver: UrlResolver<'a>,
    out: MappedOutput,
    /// Files being expanded, outermost first
    stack: Vec<PathBuf>,
    inlined: HashSet<PathBuf>,
}

impl Inliner<'_> {
    /// Write `content`, the text of `file`, with its imports expanded.
    ///
    /// The stage input is the root: its text is already relative to the
    /// output and keeps its `@charset`.
    fn expand(
        &mut self,
        content: &str,
        file: &Path,
        source: Option<u32>,
        root: bool,
    ) -> Result<(), ProcessError> {
        let index = LineIndex::new(content);
        let statements = find_statements(content, &["import", "charset"]);

        let mut last = 0;
        for statement in statements {
            self.push_text(content, last..statement.range.start, &index, file, source, root)?;
            let text = &content[statement.range.clone()];
            let origin = index.line_col(content, statement.range.start).unwrap_or((0, 0));
            last = statement.range.end;

            if statement.is("charset") {
                if root {
                    self.out.push_mapped(text, source, origin);
                } else {
                    last = skip_newline(content, last);
                }
                continue;
            }

            let Some((target, media)) = parse_prelude(statement.prelude) else {
                self.out.push_mapped(text, source, origin);
                continue;
            };
            if !media.is_empty() || is_absolute_url(target) {
                let kept = self.rebase_statement(text, file, root)?;
                self.out.push_mapped(&kept, source, origin);
                continue;
            }

            self.inline(target, file)?;
            last = skip_newline(content, last);
        }
        self.push_text(content, last..content.len(), &index, file, source, root)
    }

    fn push_text(
        &mut self,
        content: &str,
        range: std::ops::Range<usize>,
        index: &LineIndex,
        file: &Path,
        source: Option<u32>,
        root: bool,
    ) -> Result<(), ProcessError> {
        if range.is_empty() {
            return Ok(());
        }
        let origin = index.line_col(content, range.start).unwrap_or((0, 0));
        let text = &content[range];
        let text = if root || !self.ctx.url_mode.rewrites() {
            Cow::Borrowed(text)
        } else {
            // Inline mode is rebased here too; the url stage embeds later.
            Cow::Owned(
                self.resolver
                    .rewrite(text, UrlMode::Rebase, file, &self.ctx.output_path)?,
            )
        };
        self.out.push_mapped(&text, source, origin);
        Ok(())
    }

    /// Rebase the target of a rule that stays, so it resolves from the output.
    fn rebase_statement<'t>(
        &self,
        text: &'t str,
        file: &Path,
        root: bool,
    ) -> Result<Cow<'t, str>, ProcessError> {
        if root {
            return Ok(Cow::Borrowed(text));
        }
        let output = &self.ctx.output_path;
        let text = self.resolver.rewrite(text, UrlMode::Rebase, file, output)?;
        Ok(Cow::Owned(rebase_imports(&text, file, output)))
    }

    fn inline(&mut self, target: &str, importer: &Path) -> Result<(), ProcessError> {
        let path = self
            .locate(target, importer)
            .ok_or_else(|| ImportResolutionError::Unresolved {
                target: target.to_string(),
                importer: importer.to_path_buf(),
            })?;

        if self.stack.contains(&path) {
            let mut chain = self.stack.clone();
            chain.push(path);
            return Err(ImportResolutionError::Cycle { chain }.into());
        }
        if !self.inlined.insert(path.clone()) {
            tracing::debug!(file = %path.display(), "Skipping already inlined import");
            return Ok(());
        }

        let content = self
            .ctx
            .runtime
            .file_read_string(&path)
            .map_err(|source| ImportResolutionError::Read {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(file = %path.display(), bytes = content.len(), "Inlining import");

        let name = relative_path(self.ctx.output_dir(), &path);
        let source = self.out.add_source(&name, Some(&content));
        if self.ctx.comments {
            self.out.push_unmapped(&format!("{}\n", begin_marker(&name)));
        }

        self.stack.push(path.clone());
        self.expand(&content, &path, source, false)?;
        self.stack.pop();

        if !self.out.as_str().is_empty() && !self.out.as_str().ends_with('\n') {
            self.out.push_unmapped("\n");
        }
        if self.ctx.comments {
            self.out.push_unmapped(&format!("{}\n", end_marker(&name)));
        }
        Ok(())
    }

    /// Find `target` next to `importer`, then in the include paths.
    fn locate(&self, target: &str, importer: &Path) -> Option<PathBuf> {
        let path = target.split(['?', '#']).next().unwrap_or(target);
        if path.is_empty() {
            return None;
        }
        let base = importer.parent().unwrap_or(Path::new(""));
        std::iter::once(base)
            .chain(self.ctx.include_paths.iter().map(PathBuf::as_path))
            .map(|dir| normalize(&dir.join(path)))
            .find(|candidate| self.ctx.runtime.is_file(candidate).unwrap_or(false))
    }
}

fn skip_newline(content: &str, at: usize) -> usize {
    let rest = &content[at..];
    if rest.starts_with("\r\n") {
        at + 2
    } else if rest.starts_with('\n') {
        at + 1
    } else {
        at
    }
}
