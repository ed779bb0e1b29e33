//! In-process fakes for the external collaborators (testing only).
//!
//! Provides `ScriptedModel`, `ScriptedRenderer`, `RecordingMediaTools` and
//! `SilentSynthesizer`, which satisfy the trait contracts without network
//! access or external binaries.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{
    CandidateSource, ErrorClass, MediaError, RenderFailure, RenderOutcome, RenderSuccess,
    Resolution, SpeechError,
};
use crate::llm::{Completion, CompletionRequest, LanguageModel, LlmError};
use crate::media::{speed_factor, needs_adjustment, MediaTools, MuxReport, MuxRequest};
use crate::render::{RenderConfig, Renderer};
use crate::speech::{SpeechRequest, SpeechSynthesizer, SynthesizedAudio};

// ---------------------------------------------------------------------------
// ScriptedModel
// ---------------------------------------------------------------------------

/// Language model replaying queued responses in order.
///
/// Once the queue is empty it keeps returning the `repeat` response, or
/// `LlmError::EmptyResponse` when none was set.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    repeat: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn repeating(text: impl Into<String>) -> Self {
        Self {
            repeat: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn then_repeat(mut self, text: impl Into<String>) -> Self {
        self.repeat = Some(text.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        let content = match next {
            Some(response) => response?,
            None => self.repeat.clone().ok_or(LlmError::EmptyResponse)?,
        };
        Ok(Completion {
            content,
            model: "scripted".to_string(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// ScriptedRenderer
// ---------------------------------------------------------------------------

/// One call made to a [`ScriptedRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCall {
    pub candidate: CandidateSource,
    pub entry_point: String,
    pub config: RenderConfig,
}

/// Renderer replaying queued outcomes; the last outcome repeats.
#[derive(Debug, Default)]
pub struct ScriptedRenderer {
    outcomes: Mutex<VecDeque<RenderOutcome>>,
    calls: Mutex<Vec<RenderCall>>,
}

impl ScriptedRenderer {
    pub fn new(outcomes: Vec<RenderOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }
}

/// Successful outcome at `path` lasting `secs`.
pub fn success_outcome(path: impl Into<PathBuf>, secs: f64) -> RenderOutcome {
    RenderOutcome::Success(RenderSuccess {
        artifact_ref: path.into(),
        duration_secs: Some(secs),
        resolution: Resolution {
            width: 1920,
            height: 1080,
        },
        fps: 30,
    })
}

/// Failed outcome with the given class and stderr.
pub fn failure_outcome(class: ErrorClass, stderr: impl Into<String>) -> RenderOutcome {
    let mut failure = RenderFailure::new(class, stderr);
    failure.exit_code = Some(1);
    RenderOutcome::Failure(failure)
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn execute(
        &self,
        candidate: &CandidateSource,
        entry_point: &str,
        config: &RenderConfig,
    ) -> RenderOutcome {
        self.calls.lock().unwrap().push(RenderCall {
            candidate: candidate.clone(),
            entry_point: entry_point.to_string(),
            config: *config,
        });
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.len() > 1 {
            outcomes.pop_front().unwrap()
        } else {
            outcomes
                .front()
                .cloned()
                .unwrap_or_else(|| failure_outcome(ErrorClass::Unknown, "no scripted outcome"))
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingMediaTools
// ---------------------------------------------------------------------------

/// Media tools reporting fixed durations and recording every call.
///
/// `.mp4` paths probe as the video duration, anything else as the audio.
/// `mux` writes a placeholder file at the output path when its directory exists.
#[derive(Debug)]
pub struct RecordingMediaTools {
    video_secs: f64,
    audio_secs: f64,
    fail_mux: bool,
    fail_retime: bool,
    muxes: Mutex<Vec<MuxRequest>>,
    retimes: Mutex<Vec<(PathBuf, PathBuf, f64)>>,
}

impl RecordingMediaTools {
    pub fn new(video_secs: f64, audio_secs: f64) -> Self {
        Self {
            video_secs,
            audio_secs,
            fail_mux: false,
            fail_retime: false,
            muxes: Mutex::new(Vec::new()),
            retimes: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_mux(mut self) -> Self {
        self.fail_mux = true;
        self
    }

    pub fn failing_retime(mut self) -> Self {
        self.fail_retime = true;
        self
    }

    pub fn mux_calls(&self) -> Vec<MuxRequest> {
        self.muxes.lock().unwrap().clone()
    }

    pub fn retime_calls(&self) -> Vec<(PathBuf, PathBuf, f64)> {
        self.retimes.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaTools for RecordingMediaTools {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        if path.extension().is_some_and(|e| e == "mp4") {
            Ok(self.video_secs)
        } else {
            Ok(self.audio_secs)
        }
    }

    async fn mux(&self, request: &MuxRequest) -> Result<MuxReport, MediaError> {
        self.muxes.lock().unwrap().push(request.clone());
        if self.fail_mux {
            return Err(MediaError::ToolFailed {
                tool: "ffmpeg".to_string(),
                status: 1,
                stderr: "Invalid data found when processing input".to_string(),
            });
        }
        let factor = if request.adjust_speed {
            speed_factor(self.video_secs, self.audio_secs)
        } else {
            1.0
        };
        let _ = tokio::fs::write(&request.output, b"muxed").await;
        Ok(MuxReport {
            output: request.output.clone(),
            video_secs: Some(self.video_secs),
            audio_secs: Some(self.audio_secs),
            speed_factor: factor,
            reencoded: needs_adjustment(factor),
        })
    }

    async fn retime_audio(&self, input: &Path, output: &Path, rate: f64) -> Result<(), MediaError> {
        self.retimes
            .lock()
            .unwrap()
            .push((input.to_path_buf(), output.to_path_buf(), rate));
        if self.fail_retime {
            return Err(MediaError::ToolFailed {
                tool: "ffmpeg".to_string(),
                status: 1,
                stderr: "atempo: invalid argument".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SilentSynthesizer
// ---------------------------------------------------------------------------

/// Synthesizer that records requests and reports a fixed duration.
#[derive(Debug)]
pub struct SilentSynthesizer {
    duration_secs: f64,
    fail: bool,
    requests: Mutex<Vec<SpeechRequest>>,
}

impl SilentSynthesizer {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn requests(&self) -> Vec<SpeechRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for SilentSynthesizer {
    async fn synthesize(
        &self,
        request: &SpeechRequest,
        output: &Path,
    ) -> Result<SynthesizedAudio, SpeechError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(SpeechError::Status { status: 503 });
        }
        let _ = tokio::fs::write(output, b"ID3").await;
        Ok(SynthesizedAudio {
            path: output.to_path_buf(),
            duration_secs: Some(self.duration_secs),
        })
    }
}
