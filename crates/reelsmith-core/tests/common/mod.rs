#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reelsmith_core::artifact::{ArtifactStore, FsArtifactStore};
use reelsmith_core::domain::{CandidateSource, ErrorClass, JobId, RenderOutcome};
use reelsmith_core::fakes::{
    failure_outcome, success_outcome, RecordingMediaTools, ScriptedModel, ScriptedRenderer,
    SilentSynthesizer,
};
use reelsmith_core::handbook::{Catalog, Locale};
use reelsmith_core::llm::LlmError;
use reelsmith_core::oracle::{Reviewer, VerificationOracle};
use reelsmith_core::pipeline::{PipelineCoordinator, PipelineFactory, PipelineParts};
use reelsmith_core::render::{RenderConfig, Renderer};
use reelsmith_core::{
    CorrectionLoop, CorrectionPolicy, GenerationAgent, InfraRetryPolicy, Result, Storyteller,
};

pub const NO_RETRY: InfraRetryPolicy = InfraRetryPolicy {
    max_retries: 0,
    backoff_base_ms: 0,
};

pub const SCRIPT: &str = "[VISUAL SCRIPT]\n\
SCENE 1 (20s): Plot y = x^2.\n\
SCENE 2 (40s): Draw the tangent line at x = 1.\n\n\
[VOICEOVER SCRIPT]\n\
The derivative measures how fast a function changes. At x equals one the slope of the tangent is two.\n\n\
[TIMING]\n\
0:00 intro, 0:20 tangent\n";

pub fn program(n: u32) -> std::result::Result<String, LlmError> {
    Ok(format!(
        "```python\nfrom manim import *\n\nclass MainScene(Scene):\n    def construct(self):\n        self.wait({n})\n```"
    ))
}

pub fn attribute_failure(n: u32) -> RenderOutcome {
    failure_outcome(
        ErrorClass::AttributeError,
        format!("AttributeError: 'Axes' object has no attribute 'marker_{n}'"),
    )
}

/// Renderer that never finishes, for cancellation tests.
pub struct HangingRenderer;

#[async_trait]
impl Renderer for HangingRenderer {
    async fn execute(
        &self,
        _candidate: &CandidateSource,
        _entry_point: &str,
        _config: &RenderConfig,
    ) -> RenderOutcome {
        std::future::pending().await
    }
}

/// Builds coordinators from fakes, one workspace directory per job.
pub struct FakeStudio {
    pub root: FsArtifactStore,
    pub coder: Arc<ScriptedModel>,
    pub renderer: Arc<dyn Renderer>,
    pub media: Arc<RecordingMediaTools>,
    pub voice: Arc<SilentSynthesizer>,
    pub max_retries: u32,
    pub panic_on_build: bool,
}

impl FakeStudio {
    pub fn new(root: &Path, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            root: FsArtifactStore::new(root).unwrap(),
            coder: Arc::new(ScriptedModel::repeating(program(1).unwrap())),
            renderer,
            media: Arc::new(RecordingMediaTools::new(60.0, 60.0)),
            voice: Arc::new(SilentSynthesizer::new(60.0)),
            max_retries: 5,
            panic_on_build: false,
        }
    }

    pub fn succeeding(root: &Path) -> Self {
        Self::new(
            root,
            Arc::new(ScriptedRenderer::new(vec![success_outcome(
                root.join("render.mp4"),
                60.0,
            )])),
        )
    }

    pub fn with_coder(mut self, coder: ScriptedModel) -> Self {
        self.coder = Arc::new(coder);
        self
    }

    pub fn with_media(mut self, media: RecordingMediaTools) -> Self {
        self.media = Arc::new(media);
        self
    }

    pub fn store_for(&self, job: &JobId) -> FsArtifactStore {
        self.root.scoped(job.as_str()).unwrap()
    }
}

impl PipelineFactory for FakeStudio {
    fn build(&self, job: &JobId) -> Result<PipelineCoordinator> {
        if self.panic_on_build {
            panic!("factory exploded");
        }
        let store: Arc<dyn ArtifactStore> = Arc::new(self.root.scoped(job.as_str())?);
        let catalog = Catalog::new(Locale::En);

        let storyteller = Storyteller::new(
            Arc::new(ScriptedModel::repeating(SCRIPT)),
            catalog,
            Arc::clone(&store),
        )
        .with_infra_policy(NO_RETRY);
        let agent = GenerationAgent::new(self.coder.clone(), catalog, Arc::clone(&store))
            .with_infra_policy(NO_RETRY);
        let oracle = VerificationOracle::new(Reviewer::AutoApprove, catalog);
        let correction = CorrectionLoop::new(agent, Arc::clone(&self.renderer), oracle)
            .with_policy(CorrectionPolicy {
                max_retries: self.max_retries,
            });

        Ok(PipelineCoordinator::new(PipelineParts {
            storyteller,
            correction,
            synthesizer: self.voice.clone(),
            media: self.media.clone(),
            store,
        }))
    }
}
