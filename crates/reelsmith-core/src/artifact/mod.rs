pub mod fs;
pub mod memory;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

/// Canonical artifact names within one run's namespace.
///
/// Every attempt writes to the same name, so a rerun overwrites instead of
/// accumulating files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactName {
    Script,
    CandidateSource,
    SilentVideo,
    Voiceover,
    FinalVideo,
    CorrectionLog,
    CorrectionDigest,
    Other(String),
}

impl ArtifactName {
    /// Validate an externally supplied name (single path component, no traversal).
    pub fn custom(name: &str) -> Result<Self> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0'])
            && !name.starts_with('.');
        if !valid {
            return Err(ArtifactError::InvalidName(name.to_string()));
        }
        Ok(Self::from_file_name(name))
    }

    fn from_file_name(name: &str) -> Self {
        match name {
            "video_script.txt" => Self::Script,
            "animation_scene.py" => Self::CandidateSource,
            "animation_scene.mp4" => Self::SilentVideo,
            "voiceover.mp3" => Self::Voiceover,
            "final_video.mp4" => Self::FinalVideo,
            "correction.json" => Self::CorrectionLog,
            "correction.digest" => Self::CorrectionDigest,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            Self::Script => "video_script.txt",
            Self::CandidateSource => "animation_scene.py",
            Self::SilentVideo => "animation_scene.mp4",
            Self::Voiceover => "voiceover.mp3",
            Self::FinalVideo => "final_video.mp4",
            Self::CorrectionLog => "correction.json",
            Self::CorrectionDigest => "correction.digest",
            Self::Other(name) => name,
        }
    }

    /// File stem, used as the render engine's output base name.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Listing entry for one stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Errors from artifact store operations.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid artifact name: {0:?}")]
    InvalidName(String),

    #[error("artifact is not valid UTF-8: {0}")]
    NotText(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Named key → bytes storage for intermediate and final products.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `data` under `name`, replacing any previous content.
    async fn write(&self, name: &ArtifactName, data: &[u8]) -> Result<PathBuf>;

    /// Retrieve the content stored under `name`.
    async fn read(&self, name: &ArtifactName) -> Result<Vec<u8>>;

    async fn exists(&self, name: &ArtifactName) -> Result<bool>;

    /// All artifacts in this namespace, sorted by name.
    async fn list(&self) -> Result<Vec<ArtifactEntry>>;

    /// Where `name` lives (or would live) for tools that need a file path.
    fn path_of(&self, name: &ArtifactName) -> PathBuf;

    async fn write_text(&self, name: &ArtifactName, text: &str) -> Result<PathBuf> {
        self.write(name, text.as_bytes()).await
    }

    async fn read_text(&self, name: &ArtifactName) -> Result<String> {
        let bytes = self.read(name).await?;
        String::from_utf8(bytes).map_err(|_| ArtifactError::NotText(name.to_string()))
    }
}
