/*
 * postprocess/minify.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Minification stage.
 */

use async_trait::async_trait;
use lightningcss::targets::Targets;

use super::lightning::{browser_targets, transform};
use super::{StageContext, StageInput, TransformStage};
use crate::RenderResult;
use crate::error::ProcessError;

/// Minifies the stylesheet: empty rules go, whitespace collapses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinifyStage {
    /// Browsers whose prefixes must survive, when prefixing ran before
    browsers: Option<Vec<String>>,
}

impl MinifyStage {
    pub fn new(browsers: Option<Vec<String>>) -> Self {
        Self { browsers }
    }
}

#[async_trait]
impl TransformStage for MinifyStage {
    fn name(&self) -> &'static str {
        "minify"
    }

    async fn run(
        &self,
        input: &StageInput,
        ctx: &StageContext,
    ) -> Result<RenderResult, ProcessError> {
        let targets = match &self.browsers {
            Some(browsers) => browser_targets(self.name(), browsers)?,
            None => Targets::default(),
        };
        transform(self.name(), &input.css, ctx, targets, true)
    }
}
