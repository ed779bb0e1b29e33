//! Media probing, muxing and audio re-timing.

pub mod ffmpeg;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::MediaError;

pub use ffmpeg::FfmpegToolkit;

pub const MIN_SPEED: f64 = 0.5;
pub const MAX_SPEED: f64 = 2.0;

/// Factors closer to 1.0 than this are muxed without re-encoding.
pub const SPEED_TOLERANCE: f64 = 0.01;

/// Video speed factor that makes `video_secs` last as long as `audio_secs`,
/// clamped to [`MIN_SPEED`, `MAX_SPEED`]. Non-positive inputs yield 1.0.
pub fn speed_factor(video_secs: f64, audio_secs: f64) -> f64 {
    if !(video_secs > 0.0 && audio_secs > 0.0) || !video_secs.is_finite() || !audio_secs.is_finite()
    {
        return 1.0;
    }
    (video_secs / audio_secs).clamp(MIN_SPEED, MAX_SPEED)
}

/// Whether `factor` is far enough from 1.0 to need a re-encode.
pub fn needs_adjustment(factor: f64) -> bool {
    (factor - 1.0).abs() >= SPEED_TOLERANCE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxRequest {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    /// Stretch or compress the video to match the audio length.
    pub adjust_speed: bool,
}

impl MuxRequest {
    pub fn new(video: impl Into<PathBuf>, audio: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            video: video.into(),
            audio: audio.into(),
            output: output.into(),
            adjust_speed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuxReport {
    pub output: PathBuf,
    pub video_secs: Option<f64>,
    pub audio_secs: Option<f64>,
    pub speed_factor: f64,
    pub reencoded: bool,
}

/// External media tool operations.
#[async_trait]
pub trait MediaTools: Send + Sync {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError>;

    async fn mux(&self, request: &MuxRequest) -> Result<MuxReport, MediaError>;

    /// Change audio tempo by `rate` without changing pitch.
    async fn retime_audio(&self, input: &Path, output: &Path, rate: f64) -> Result<(), MediaError>;
}

/// Binary names for the media tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}
