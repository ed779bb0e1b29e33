//! Domain-level error taxonomy for Reelsmith.

use crate::artifact::ArtifactError;
use crate::llm::LlmError;

/// Errors produced while parsing a narration script.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("script has no [VISUAL SCRIPT] content")]
    EmptyVisual,

    #[error("script has no [VOICEOVER SCRIPT] section")]
    MissingNarration,

    #[error("topic must not be empty")]
    EmptyTopic,
}

/// Errors produced by the generation agent for one attempt.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("language model call failed after {attempts} attempt(s): {source}")]
    Model {
        attempts: u32,
        #[source]
        source: LlmError,
    },

    #[error("model response contained no program text")]
    EmptyCandidate,

    #[error("invalid script: {0}")]
    InvalidScript(#[from] ScriptError),

    #[error("failed to persist candidate: {0}")]
    Artifact(#[from] ArtifactError),
}

/// Errors from external media tools (ffmpeg / ffprobe).
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media tool not found: {0}")]
    ToolNotFound(String),

    #[error("{tool} exited with status {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: i32,
        stderr: String,
    },

    #[error("input file not found: {0}")]
    MissingInput(std::path::PathBuf),

    #[error("could not parse duration from probe output: {0:?}")]
    UnparseableDuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from voice synthesis.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("nothing to synthesize")]
    EmptyText,

    #[error("speech endpoint error: {0}")]
    Http(String),

    #[error("speech endpoint returned status {status}")]
    Status { status: u16 },

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        SpeechError::Http(err.to_string())
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors from the job registry.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job {0} is still running")]
    StillRunning(String),
}

/// Reelsmith domain errors.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("render engine not available: {0}")]
    ToolNotFound(String),

    #[error("code could not be fixed after {attempts} attempt(s): {report}")]
    CorrectionExhausted { attempts: u32, report: String },

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("job error: {0}")]
    Job(#[from] JobError),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Reelsmith domain operations.
pub type Result<T> = std::result::Result<T, StudioError>;
