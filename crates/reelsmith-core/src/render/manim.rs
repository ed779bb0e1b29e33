//! Manim subprocess renderer.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use super::classify::{default_rules, ClassificationRules};
use super::config::{RenderConfig, RenderSettings};
use super::Renderer;
use crate::artifact::ArtifactName;
use crate::domain::{CandidateSource, ErrorClass, RenderFailure, RenderOutcome, RenderSuccess};
use crate::media::MediaTools;

pub struct ManimRenderer {
    settings: RenderSettings,
    workspace: PathBuf,
    rules: ClassificationRules,
    probe: Option<Arc<dyn MediaTools>>,
}

impl ManimRenderer {
    pub fn new(settings: RenderSettings, workspace: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            workspace: workspace.into(),
            rules: default_rules(),
            probe: None,
        }
    }

    /// Probe rendered videos for their duration.
    pub fn with_probe(mut self, probe: Arc<dyn MediaTools>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_rules(mut self, rules: ClassificationRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn source_path(&self) -> PathBuf {
        self.workspace.join(ArtifactName::CandidateSource.file_name())
    }

    fn canonical_output(&self) -> PathBuf {
        self.workspace.join(ArtifactName::SilentVideo.file_name())
    }

    /// Command line, relative to the workspace.
    pub fn command_args(&self, entry_point: &str, config: &RenderConfig) -> Vec<String> {
        vec![
            format!("-q{}", config.quality.flag()),
            "--fps".to_string(),
            config.effective_fps().to_string(),
            ArtifactName::CandidateSource.file_name().to_string(),
            entry_point.to_string(),
            "--media_dir".to_string(),
            ".".to_string(),
            "-o".to_string(),
            ArtifactName::SilentVideo.stem().to_string(),
        ]
    }

    fn engine_outputs(&self) -> impl Iterator<Item = walkdir::DirEntry> {
        let wanted = ArtifactName::SilentVideo.file_name();
        WalkDir::new(&self.workspace)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(move |e| e.file_type().is_file() && e.file_name() == wanted)
    }

    /// Remove outputs left by earlier attempts so a stale video is never picked up.
    fn clear_previous_outputs(&self) {
        for entry in self.engine_outputs() {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                warn!(path = %entry.path().display(), error = %e, "cannot remove stale output");
            }
        }
    }

    /// Newest engine output anywhere under the workspace.
    fn find_output(&self) -> Option<PathBuf> {
        self.engine_outputs()
            .filter_map(|e| {
                let modified = e.metadata().ok()?.modified().ok()?;
                Some((modified, e.into_path()))
            })
            .max_by_key(|(modified, _)| *modified)
            .map(|(_, path)| path)
    }

    async fn run_engine(
        &self,
        entry_point: &str,
        config: &RenderConfig,
    ) -> Result<std::process::Output, RenderFailure> {
        let child = Command::new(&self.settings.binary)
            .args(self.command_args(entry_point, config))
            .current_dir(&self.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RenderFailure::new(
                    ErrorClass::ToolNotFound,
                    format!("'{}' command not found: {e}", self.settings.binary),
                ));
            }
            Err(e) => {
                return Err(RenderFailure::new(
                    ErrorClass::Unknown,
                    format!("failed to spawn '{}': {e}", self.settings.binary),
                ));
            }
        };

        let limit = Duration::from_secs(self.settings.timeout_secs);
        match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(RenderFailure::new(
                ErrorClass::Unknown,
                format!("failed waiting for render process: {e}"),
            )),
            // Dropping the wait future kills the child.
            Err(_) => Err(RenderFailure::new(
                ErrorClass::Timeout,
                format!(
                    "render exceeded the {}s time limit and was killed",
                    self.settings.timeout_secs
                ),
            )),
        }
    }
}

#[async_trait]
impl Renderer for ManimRenderer {
    #[instrument(skip(self, candidate, config), fields(quality = %config.quality))]
    async fn execute(
        &self,
        candidate: &CandidateSource,
        entry_point: &str,
        config: &RenderConfig,
    ) -> RenderOutcome {
        if !candidate.declares(entry_point) {
            return RenderOutcome::Failure(RenderFailure::new(
                ErrorClass::EntryPointNotFound,
                format!("scene class '{entry_point}' is not declared in the program"),
            ));
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.workspace).await {
            return RenderOutcome::Failure(RenderFailure::new(
                ErrorClass::Unknown,
                format!("cannot create workspace: {e}"),
            ));
        }
        if let Err(e) = tokio::fs::write(self.source_path(), &candidate.code).await {
            return RenderOutcome::Failure(RenderFailure::new(
                ErrorClass::Unknown,
                format!("cannot write program: {e}"),
            ));
        }
        let canonical = self.canonical_output();
        self.clear_previous_outputs();

        let output = match self.run_engine(entry_point, config).await {
            Ok(output) => output,
            Err(failure) => {
                warn!(class = %failure.error_class, "render did not run to completion");
                return RenderOutcome::Failure(failure);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let error_class = self.rules.classify(&stderr, &stdout);
            info!(class = %error_class, code = ?output.status.code(), "render failed");
            return RenderOutcome::Failure(RenderFailure {
                error_class,
                raw_stdout: stdout,
                raw_stderr: stderr,
                exit_code: output.status.code(),
            });
        }

        let Some(produced) = self.find_output() else {
            return RenderOutcome::Failure(RenderFailure {
                error_class: ErrorClass::Unknown,
                raw_stdout: stdout,
                raw_stderr: format!(
                    "{stderr}\nrender exited successfully but produced no {}",
                    ArtifactName::SilentVideo
                ),
                exit_code: output.status.code(),
            });
        };
        debug!(path = %produced.display(), "engine output located");

        if produced != canonical {
            if let Err(e) = tokio::fs::copy(&produced, &canonical).await {
                return RenderOutcome::Failure(RenderFailure::new(
                    ErrorClass::Unknown,
                    format!("cannot copy {} to canonical name: {e}", produced.display()),
                ));
            }
        }

        let duration_secs = match &self.probe {
            Some(probe) => match probe.probe_duration(&canonical).await {
                Ok(secs) => Some(secs),
                Err(e) => {
                    warn!(error = %e, "duration probe failed");
                    None
                }
            },
            None => None,
        };

        RenderOutcome::Success(RenderSuccess {
            artifact_ref: canonical,
            duration_secs,
            resolution: config.quality.resolution(),
            fps: config.effective_fps(),
        })
    }
}
