//! Job submission and status types shared by the registry and the HTTP service.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::script::Topic;

/// Short job identifier (first 8 hex chars of a v4 UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(simple[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Longest video a single job may ask for, in minutes.
pub const MAX_DURATION_MINUTES: u32 = 10;

/// A request to produce one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub topic: Topic,
    /// Narration language code (`en`, `vi`, ...) or `auto`.
    pub language: String,
    pub duration_minutes: u32,
}

impl JobRequest {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            language: "en".to_string(),
            duration_minutes: 1,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Clamped into `1..=MAX_DURATION_MINUTES`.
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes.clamp(1, MAX_DURATION_MINUTES);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }
}

/// Observable status of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub topic: String,
    pub language: String,
    pub duration: u32,
    pub status: JobState,
    pub phase: String,
    /// 0..=100, never decreases.
    pub progress: u8,
    pub error: Option<String>,
    pub video_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn queued(id: JobId, request: &JobRequest, phase: impl Into<String>) -> Self {
        Self {
            id,
            topic: request.topic.to_string(),
            language: request.language.clone(),
            duration: request.duration_minutes,
            status: JobState::Queued,
            phase: phase.into(),
            progress: 0,
            error: None,
            video_path: None,
            created_at: Utc::now(),
        }
    }
}
