//! Pipeline coordinator: script → correction loop → voice → mux.
//!
//! Phases run strictly in sequence; each consumes the artifact the previous
//! one wrote. Progress is published through a [`ProgressReporter`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::agent::{GenerationAgent, Storyteller};
use crate::artifact::fs::FsArtifactStore;
use crate::artifact::{ArtifactName, ArtifactStore};
use crate::config::StudioConfig;
use crate::correction::{
    write_correction_artifact, CorrectionLog, CorrectionLoop, CorrectionOutcome, LoopObserver,
};
use crate::domain::{FailureReport, JobId, JobRequest, Result, StudioError};
use crate::handbook::{Catalog, Phase};
use crate::jobs::ProgressReporter;
use crate::llm::openai::OpenAiCompatibleModel;
use crate::llm::{LanguageModel, ModelSettings};
use crate::media::{FfmpegToolkit, MediaTools, MuxRequest};
use crate::obs;
use crate::oracle::{Reviewer, VerificationOracle};
use crate::render::{ManimRenderer, Renderer};
use crate::speech::{SpeechRequest, SpeechSynthesizer, TranslateTtsSynthesizer, VoiceLanguage};

pub const PROGRESS_SCRIPT: u8 = 10;
pub const PROGRESS_CODING: u8 = 30;
pub const PROGRESS_APPROVED: u8 = 60;
pub const PROGRESS_VOICE: u8 = 70;
pub const PROGRESS_MUX: u8 = 85;

/// Collaborators for one run, all scoped to the same artifact namespace.
pub struct PipelineParts {
    pub storyteller: Storyteller,
    pub correction: CorrectionLoop,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub media: Arc<dyn MediaTools>,
    pub store: Arc<dyn ArtifactStore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub final_video: PathBuf,
    /// Narration length, which the final video is stretched to match.
    pub duration_secs: Option<f64>,
    pub speed_factor: f64,
    pub attempts: u32,
    pub correction_log: CorrectionLog,
}

/// Forwards loop attempts to the job status.
struct AttemptProgress<'a> {
    run_id: &'a str,
    reporter: &'a ProgressReporter,
}

impl LoopObserver for AttemptProgress<'_> {
    fn on_attempt(&self, attempt: u32, max: u32) {
        enter(
            self.run_id,
            self.reporter,
            Phase::Attempt { attempt, max },
            PROGRESS_CODING,
        );
    }

    fn on_rejected(&self, attempt: u32, report: &FailureReport) {
        info!(attempt, class = ?report.error_class, "attempt rejected, regenerating");
    }
}

fn enter(run_id: &str, reporter: &ProgressReporter, phase: Phase, progress: u8) {
    let label = reporter.catalog().phase_label(phase);
    obs::emit_phase_entered(run_id, &label, progress);
    reporter.phase(label, progress);
}

pub struct PipelineCoordinator {
    parts: PipelineParts,
}

impl PipelineCoordinator {
    pub fn new(parts: PipelineParts) -> Self {
        Self { parts }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.parts.store
    }

    /// Produce the final video for `request`.
    ///
    /// Returns `CorrectionExhausted` carrying the last attempt's report when no
    /// candidate was accepted; voice and mux are skipped in that case.
    /// Terminal status is left to the caller.
    #[instrument(skip_all, fields(topic = %request.topic))]
    pub async fn run(
        &self,
        request: &JobRequest,
        reporter: &ProgressReporter,
    ) -> Result<PipelineResult> {
        let started = Instant::now();
        let run_id = reporter.job_id();
        let run_id = run_id.as_str();
        let parts = &self.parts;
        obs::emit_run_started(run_id, request.topic.as_str(), &request.language);

        enter(run_id, reporter, Phase::Script, PROGRESS_SCRIPT);
        let script = parts.storyteller.write_script(request).await?;

        enter(run_id, reporter, Phase::Coding, PROGRESS_CODING);
        let observer = AttemptProgress { run_id, reporter };
        let log = parts.correction.run(run_id, &script, &observer).await?;
        write_correction_artifact(&log, parts.store.as_ref()).await?;

        let render = match &log.outcome {
            CorrectionOutcome::Accepted { render, .. } => render.clone(),
            CorrectionOutcome::Exhausted { last_report } => {
                return Err(StudioError::CorrectionExhausted {
                    attempts: log.attempts_used,
                    report: last_report.text.clone(),
                });
            }
        };
        enter(run_id, reporter, Phase::Approved, PROGRESS_APPROVED);

        enter(run_id, reporter, Phase::Voice, PROGRESS_VOICE);
        let voice_path = parts.store.path_of(&ArtifactName::Voiceover);
        let speech = SpeechRequest::new(script.narration.clone(), VoiceLanguage::parse(&request.language));
        let audio = parts.synthesizer.synthesize(&speech, &voice_path).await?;

        enter(run_id, reporter, Phase::Mux, PROGRESS_MUX);
        let final_path = parts.store.path_of(&ArtifactName::FinalVideo);
        let mux = MuxRequest::new(render.artifact_ref.clone(), audio.path.clone(), final_path);
        let report = parts.media.mux(&mux).await?;

        let elapsed = started.elapsed().as_millis() as u64;
        obs::emit_run_finished(run_id, &report.output.display().to_string(), elapsed);

        Ok(PipelineResult {
            final_video: report.output,
            duration_secs: report.audio_secs.or(audio.duration_secs),
            speed_factor: report.speed_factor,
            attempts: log.attempts_used,
            correction_log: log,
        })
    }
}

/// Builds one coordinator per job.
pub trait PipelineFactory: Send + Sync {
    fn build(&self, job: &JobId) -> Result<PipelineCoordinator>;
}

/// Production factory: OpenAI-compatible models, manim, ffmpeg and the
/// translate TTS endpoint, with one workspace directory per job.
pub struct StudioFactory {
    config: StudioConfig,
    root: FsArtifactStore,
    media: Arc<dyn MediaTools>,
}

impl StudioFactory {
    pub fn new(config: StudioConfig) -> Result<Self> {
        let root = FsArtifactStore::new(&config.workspace)?;
        let media: Arc<dyn MediaTools> = Arc::new(FfmpegToolkit::new(config.media.clone()));
        Ok(Self {
            config,
            root,
            media,
        })
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    /// Store over the workspace root; job namespaces are its subdirectories.
    pub fn workspace(&self) -> &FsArtifactStore {
        &self.root
    }

    pub fn media(&self) -> Arc<dyn MediaTools> {
        Arc::clone(&self.media)
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.config.locale)
    }

    fn model(settings: &ModelSettings) -> Result<Arc<dyn LanguageModel>> {
        Ok(Arc::new(OpenAiCompatibleModel::new(settings.clone())?))
    }

    /// Renderer writing into `workspace`, probing with this factory's media tools.
    pub fn renderer(&self, workspace: impl Into<PathBuf>) -> ManimRenderer {
        ManimRenderer::new(self.config.render.clone(), workspace).with_probe(self.media())
    }

    pub fn storyteller(&self, store: Arc<dyn ArtifactStore>) -> Result<Storyteller> {
        Ok(
            Storyteller::new(Self::model(&self.config.llm.creative)?, self.catalog(), store)
                .with_infra_policy(self.config.llm.infra_retry),
        )
    }

    fn oracle(&self) -> Result<VerificationOracle> {
        let reviewer = if self.config.review.auto_approve {
            Reviewer::AutoApprove
        } else {
            Reviewer::Model(Self::model(&self.config.llm.reviewer)?)
        };
        Ok(VerificationOracle::new(reviewer, self.catalog())
            .with_report_limit(self.config.review.report_limit)
            .with_infra_policy(self.config.llm.infra_retry))
    }
}

impl PipelineFactory for StudioFactory {
    fn build(&self, job: &JobId) -> Result<PipelineCoordinator> {
        let scoped = self.root.scoped(job.as_str())?;
        let renderer: Arc<dyn Renderer> = Arc::new(self.renderer(scoped.root()));
        let store: Arc<dyn ArtifactStore> = Arc::new(scoped);

        let agent = GenerationAgent::new(
            Self::model(&self.config.llm.coder)?,
            self.catalog(),
            Arc::clone(&store),
        )
        .with_infra_policy(self.config.llm.infra_retry);

        let correction = CorrectionLoop::new(agent, renderer, self.oracle()?)
            .with_policy(self.config.correction)
            .with_render_config(self.config.render.render_config())
            .with_entry_point_fallback(self.config.render.entry_point_fallback.clone());

        let synthesizer = TranslateTtsSynthesizer::new(self.config.speech.clone(), self.media())?;

        Ok(PipelineCoordinator::new(PipelineParts {
            storyteller: self.storyteller(Arc::clone(&store))?,
            correction,
            synthesizer: Arc::new(synthesizer),
            media: self.media(),
            store,
        }))
    }
}
