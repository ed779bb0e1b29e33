//! Renderer adapter: executes a candidate program and reports a structured outcome.

pub mod classify;
pub mod config;
pub mod manim;

use async_trait::async_trait;

use crate::domain::{CandidateSource, RenderOutcome};

pub use classify::{default_rules, ClassificationRule, ClassificationRules};
pub use config::{Quality, RenderConfig, RenderSettings, SUPPORTED_FPS};
pub use manim::ManimRenderer;

/// Executes candidates. Failures are returned as data, never as `Err`.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn execute(
        &self,
        candidate: &CandidateSource,
        entry_point: &str,
        config: &RenderConfig,
    ) -> RenderOutcome;
}
