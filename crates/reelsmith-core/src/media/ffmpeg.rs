//! ffmpeg / ffprobe subprocess implementation of [`MediaTools`].

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::{needs_adjustment, speed_factor, MediaSettings, MediaTools, MuxReport, MuxRequest};
use crate::domain::MediaError;
use crate::oracle::truncate_tail;

const STDERR_LIMIT: usize = 2000;

#[derive(Debug, Clone, Default)]
pub struct FfmpegToolkit {
    settings: MediaSettings,
}

impl FfmpegToolkit {
    pub fn new(settings: MediaSettings) -> Self {
        Self { settings }
    }

    async fn run(&self, tool: &str, args: Vec<OsString>) -> Result<String, MediaError> {
        let output = Command::new(tool)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::ToolNotFound(tool.to_string()),
                _ => MediaError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::ToolFailed {
                tool: tool.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: truncate_tail(stderr.trim_end(), STDERR_LIMIT),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

async fn require(path: &Path) -> Result<(), MediaError> {
    if tokio::fs::try_exists(path).await? {
        Ok(())
    } else {
        Err(MediaError::MissingInput(path.to_path_buf()))
    }
}

/// Parse the bare duration printed by `ffprobe ... nokey=1`.
pub fn parse_duration(stdout: &str) -> Result<f64, MediaError> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| MediaError::UnparseableDuration(stdout.trim().to_string()))
}

/// Arguments for the final mux, with or without a video speed filter.
pub fn mux_args(request: &MuxRequest, factor: f64) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        request.video.clone().into(),
        "-i".into(),
        request.audio.clone().into(),
    ];
    if needs_adjustment(factor) {
        let filter: [OsString; 4] = [
            "-filter:v".into(),
            format!("setpts=PTS/{factor:.4}").into(),
            "-c:v".into(),
            "libx264".into(),
        ];
        args.extend(filter);
    } else {
        let copy: [OsString; 2] = ["-c:v".into(), "copy".into()];
        args.extend(copy);
    }
    let tail: [OsString; 4] = [
        "-c:a".into(),
        "aac".into(),
        "-shortest".into(),
        request.output.clone().into(),
    ];
    args.extend(tail);
    args
}

#[async_trait]
impl MediaTools for FfmpegToolkit {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        require(path).await?;
        let stdout = self
            .run(
                &self.settings.ffprobe,
                vec![
                    "-v".into(),
                    "error".into(),
                    "-show_entries".into(),
                    "format=duration".into(),
                    "-of".into(),
                    "default=noprint_wrappers=1:nokey=1".into(),
                    path.into(),
                ],
            )
            .await?;
        parse_duration(&stdout)
    }

    #[instrument(skip(self, request), fields(output = %request.output.display()))]
    async fn mux(&self, request: &MuxRequest) -> Result<MuxReport, MediaError> {
        require(&request.video).await?;
        require(&request.audio).await?;

        let (video_secs, audio_secs, factor) = if request.adjust_speed {
            let video = self.probe_duration(&request.video).await?;
            let audio = self.probe_duration(&request.audio).await?;
            (Some(video), Some(audio), speed_factor(video, audio))
        } else {
            (None, None, 1.0)
        };
        let reencoded = needs_adjustment(factor);
        debug!(factor, reencoded, "muxing");

        self.run(&self.settings.ffmpeg, mux_args(request, factor))
            .await?;
        info!(factor, reencoded, "mux complete");

        Ok(MuxReport {
            output: request.output.clone(),
            video_secs,
            audio_secs,
            speed_factor: factor,
            reencoded,
        })
    }

    async fn retime_audio(&self, input: &Path, output: &Path, rate: f64) -> Result<(), MediaError> {
        require(input).await?;
        self.run(
            &self.settings.ffmpeg,
            vec![
                "-y".into(),
                "-i".into(),
                input.into(),
                "-filter:a".into(),
                format!("atempo={rate:.4}").into(),
                output.into(),
            ],
        )
        .await?;
        Ok(())
    }
}
