/*
 * postprocess/prefix.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Vendor prefixing stage.
 */

use async_trait::async_trait;

use super::lightning::{browser_targets, transform};
use super::{StageContext, StageInput, TransformStage};
use crate::RenderResult;
use crate::error::ProcessError;

/// Adds the vendor prefixes the target browsers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixStage {
    browsers: Vec<String>,
}

impl PrefixStage {
    /// `browsers` are browserslist queries such as `"ie 10"` or `"defaults"`.
    pub fn new(browsers: Vec<String>) -> Self {
        Self { browsers }
    }

    pub fn browsers(&self) -> &[String] {
        &self.browsers
    }
}

#[async_trait]
impl TransformStage for PrefixStage {
    fn name(&self) -> &'static str {
        "prefix"
    }

    async fn run(
        &self,
        input: &StageInput,
        ctx: &StageContext,
    ) -> Result<RenderResult, ProcessError> {
        let targets = browser_targets(self.name(), &self.browsers)?;
        transform(self.name(), &input.css, ctx, targets, false)
    }
}
