/*
 * postprocess/url.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * URL rewriting stage.
 */

use async_trait::async_trait;
use cssbundle_source_map::identity_map;

use super::{StageContext, StageInput, TransformStage};
use crate::RenderResult;
use crate::error::ProcessError;
use crate::url::UrlResolver;

/// Rebases or inlines the `url(...)` references of the whole stylesheet.
///
/// Text reaching this stage is already relative to the output file, so
/// both ends of the rewrite are the output path; rebasing only normalizes.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlStage;

#[async_trait]
impl TransformStage for UrlStage {
    fn name(&self) -> &'static str {
        "url"
    }

    async fn run(
        &self,
        input: &StageInput,
        ctx: &StageContext,
    ) -> Result<RenderResult, ProcessError> {
        let resolver = UrlResolver::new(ctx.runtime.as_ref(), &ctx.include_paths);
        let css = resolver.rewrite(&input.css, ctx.url_mode, &ctx.output_path, &ctx.output_path)?;
        let file = ctx.file_name();
        let map = ctx.maps().then(|| identity_map(&file, &file, &css));
        Ok(RenderResult { css, map })
    }
}
