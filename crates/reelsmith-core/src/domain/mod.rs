//! Domain models for Reelsmith.
//!
//! Canonical definitions for the core entities:
//! - `ScriptArtifact`: three-section narration script
//! - `CandidateSource`: one generated animation program
//! - `RenderOutcome` / `FailureReport`: execution results and feedback
//! - `JobRequest` / `JobStatus`: job submission and observation

pub mod candidate;
pub mod error;
pub mod job;
pub mod outcome;
pub mod script;

pub use candidate::CandidateSource;
pub use error::{
    ConfigError, GenerationError, JobError, MediaError, Result, ScriptError, SpeechError,
    StudioError,
};
pub use job::{JobId, JobRequest, JobState, JobStatus, MAX_DURATION_MINUTES};
pub use outcome::{ErrorClass, FailureReport, RenderFailure, RenderOutcome, RenderSuccess, Resolution};
pub use script::{Scene, ScriptArtifact, Topic, VisualDirection};
