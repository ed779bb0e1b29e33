//! Reelsmith Core Library
//!
//! Turns a topic into a narrated explainer video: a narration script, a
//! generated animation program repaired through a bounded render-and-review
//! loop, a synthesized voiceover and a duration-matched final mux.

pub mod agent;
pub mod artifact;
pub mod config;
pub mod correction;
pub mod domain;
pub mod fakes;
pub mod handbook;
pub mod jobs;
pub mod llm;
pub mod media;
pub mod obs;
pub mod oracle;
pub mod pipeline;
pub mod render;
pub mod speech;
pub mod telemetry;

pub use domain::{
    CandidateSource, ErrorClass, FailureReport, JobId, JobRequest, JobState, JobStatus,
    RenderFailure, RenderOutcome, RenderSuccess, Result, ScriptArtifact, StudioError, Topic,
};

pub use agent::{GenerationAgent, InfraRetryPolicy, Storyteller};
pub use artifact::{ArtifactEntry, ArtifactError, ArtifactName, ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use config::StudioConfig;
pub use correction::{
    read_correction_artifact, write_correction_artifact, CorrectionLog, CorrectionLoop,
    CorrectionOutcome, CorrectionPolicy, LoopObserver, LoopState, NoopObserver,
};
pub use handbook::{Catalog, Handbook, Locale, Phase};
pub use jobs::{JobHandle, JobRegistry, ProgressReporter};
pub use llm::{LanguageModel, LlmError, ModelSettings, OpenAiCompatibleModel};
pub use media::{speed_factor, FfmpegToolkit, MediaTools, MuxReport, MuxRequest};
pub use oracle::{Reviewer, Verdict, VerificationOracle, VerificationResult};
pub use pipeline::{PipelineCoordinator, PipelineFactory, PipelineParts, PipelineResult, StudioFactory};
pub use render::{ManimRenderer, Quality, RenderConfig, RenderSettings, Renderer};
pub use speech::{SpeechRequest, SpeechSynthesizer, TranslateTtsSynthesizer, VoiceLanguage};
pub use telemetry::init_tracing;

/// Reelsmith version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
