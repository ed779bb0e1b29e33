//! Bounded Generate → Render → Verify correction loop.
//!
//! This module provides:
//! - the attempt loop, where attempt *k*'s report (and only that) feeds attempt *k+1*
//! - an auditable correction log with digest verification

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::agent::GenerationAgent;
use crate::artifact::{ArtifactName, ArtifactStore};
use crate::domain::{
    CandidateSource, ErrorClass, FailureReport, GenerationError, RenderOutcome, RenderSuccess,
    Result, ScriptArtifact, StudioError,
};
use crate::obs;
use crate::oracle::{truncate_tail, VerificationOracle};
use crate::render::{RenderConfig, Renderer};

const EXCERPT_LIMIT: usize = 400;

/// Code-repair budget. Constant, no backoff: failures here are code-level, not transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionPolicy {
    pub max_retries: u32,
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self { max_retries: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Attempting,
    Accepted,
    Exhausted,
}

/// One attempt in the correction timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub entry_point: Option<String>,
    /// `None` when the render succeeded.
    pub error_class: Option<ErrorClass>,
    pub accepted: bool,
    pub report_excerpt: Option<String>,
}

/// Terminal loop result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CorrectionOutcome {
    Accepted {
        candidate: CandidateSource,
        render: RenderSuccess,
    },
    Exhausted {
        last_report: FailureReport,
    },
}

/// Full correction log for artifacts and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionLog {
    pub run_id: String,
    pub policy: CorrectionPolicy,
    pub attempts: Vec<AttemptRecord>,
    pub outcome: CorrectionOutcome,
    pub attempts_used: u32,
    pub evaluated_at: DateTime<Utc>,
}

impl CorrectionLog {
    pub fn state(&self) -> LoopState {
        match self.outcome {
            CorrectionOutcome::Accepted { .. } => LoopState::Accepted,
            CorrectionOutcome::Exhausted { .. } => LoopState::Exhausted,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.state() == LoopState::Accepted
    }
}

/// Receives per-attempt progress from the loop.
pub trait LoopObserver: Send + Sync {
    fn on_attempt(&self, attempt: u32, max: u32);

    fn on_rejected(&self, _attempt: u32, _report: &FailureReport) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl LoopObserver for NoopObserver {
    fn on_attempt(&self, _attempt: u32, _max: u32) {}
}

pub struct CorrectionLoop {
    agent: GenerationAgent,
    renderer: Arc<dyn Renderer>,
    oracle: VerificationOracle,
    policy: CorrectionPolicy,
    render_config: RenderConfig,
    entry_point_fallback: String,
}

impl CorrectionLoop {
    pub fn new(
        agent: GenerationAgent,
        renderer: Arc<dyn Renderer>,
        oracle: VerificationOracle,
    ) -> Self {
        Self {
            agent,
            renderer,
            oracle,
            policy: CorrectionPolicy::default(),
            render_config: RenderConfig::default(),
            entry_point_fallback: "MainScene".to_string(),
        }
    }

    pub fn with_policy(mut self, policy: CorrectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_render_config(mut self, config: RenderConfig) -> Self {
        self.render_config = config;
        self
    }

    pub fn with_entry_point_fallback(mut self, entry: impl Into<String>) -> Self {
        self.entry_point_fallback = entry.into();
        self
    }

    pub fn policy(&self) -> &CorrectionPolicy {
        &self.policy
    }

    fn finish(
        &self,
        run_id: &str,
        attempts: Vec<AttemptRecord>,
        outcome: CorrectionOutcome,
    ) -> CorrectionLog {
        let log = CorrectionLog {
            run_id: run_id.to_string(),
            policy: self.policy,
            attempts_used: attempts.len() as u32,
            attempts,
            outcome,
            evaluated_at: Utc::now(),
        };
        obs::emit_loop_finished(run_id, log.is_accepted(), log.attempts_used);
        log
    }

    /// Run attempts strictly in sequence until one is accepted or the budget is spent.
    ///
    /// Aborts early (without consuming further attempts) when the render engine
    /// is missing, when the model endpoint stays unavailable, or when the
    /// artifact store cannot be written.
    #[instrument(skip(self, script, observer), fields(max = self.policy.max_retries))]
    pub async fn run(
        &self,
        run_id: &str,
        script: &ScriptArtifact,
        observer: &dyn LoopObserver,
    ) -> Result<CorrectionLog> {
        let max = self.policy.max_retries;
        let mut prior: Option<FailureReport> = None;
        let mut attempts = Vec::new();

        for attempt in 1..=max {
            observer.on_attempt(attempt, max);
            obs::emit_attempt_started(run_id, attempt, max);

            let candidate = match self.agent.generate(script, prior.as_ref()).await {
                Ok(candidate) => candidate,
                Err(GenerationError::EmptyCandidate) => {
                    let report = empty_candidate_report(attempt);
                    attempts.push(record(attempt, None, None, &report));
                    obs::emit_attempt_rejected(run_id, attempt, None);
                    observer.on_rejected(attempt, &report);
                    prior = Some(report);
                    continue;
                }
                Err(GenerationError::Artifact(e)) => return Err(StudioError::Artifact(e)),
                Err(e) => return Err(StudioError::Generation(e)),
            };

            let entry_point = candidate
                .entry_point
                .clone()
                .unwrap_or_else(|| self.entry_point_fallback.clone());
            let outcome = self
                .renderer
                .execute(&candidate, &entry_point, &self.render_config)
                .await;

            if let RenderOutcome::Failure(failure) = &outcome {
                if !failure.error_class.is_retriable() {
                    obs::emit_attempt_rejected(run_id, attempt, Some(failure.error_class));
                    return Err(StudioError::ToolNotFound(failure.raw_stderr.clone()));
                }
            }

            let verification = self.oracle.verify(attempt, &outcome, script).await?;

            match (verification.accepted, outcome) {
                (true, RenderOutcome::Success(render)) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        entry_point: Some(entry_point),
                        error_class: None,
                        accepted: true,
                        report_excerpt: None,
                    });
                    info!(attempt, "candidate accepted");
                    return Ok(self.finish(
                        run_id,
                        attempts,
                        CorrectionOutcome::Accepted { candidate, render },
                    ));
                }
                (_, outcome) => {
                    let report = verification
                        .report
                        .unwrap_or_else(|| self.oracle.failure_report_for(attempt, &outcome));
                    attempts.push(record(
                        attempt,
                        Some(entry_point),
                        outcome.error_class(),
                        &report,
                    ));
                    obs::emit_attempt_rejected(run_id, attempt, outcome.error_class());
                    observer.on_rejected(attempt, &report);
                    // Replace, never accumulate.
                    prior = Some(report);
                }
            }
        }

        let last_report = prior.unwrap_or_else(|| FailureReport {
            attempt: 0,
            error_class: None,
            hint: None,
            text: "no correction attempts were allowed".to_string(),
        });
        Ok(self.finish(run_id, attempts, CorrectionOutcome::Exhausted { last_report }))
    }
}

fn record(
    attempt: u32,
    entry_point: Option<String>,
    error_class: Option<ErrorClass>,
    report: &FailureReport,
) -> AttemptRecord {
    AttemptRecord {
        attempt,
        entry_point,
        error_class,
        accepted: false,
        report_excerpt: Some(truncate_tail(&report.text, EXCERPT_LIMIT)),
    }
}

fn empty_candidate_report(attempt: u32) -> FailureReport {
    FailureReport {
        attempt,
        error_class: None,
        hint: None,
        text: format!(
            "Attempt {attempt} returned no program. Reply with the complete Manim program in a single ```python block."
        ),
    }
}

fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist `correction.json` and `correction.digest` in the run's store.
pub async fn write_correction_artifact(
    log: &CorrectionLog,
    store: &dyn ArtifactStore,
) -> Result<PathBuf> {
    let json = serde_json::to_vec_pretty(log)?;
    let digest = digest_hex(&json);

    let path = store.write(&ArtifactName::CorrectionLog, &json).await?;
    store
        .write_text(&ArtifactName::CorrectionDigest, &digest)
        .await?;

    Ok(path)
}

/// Read `correction.json` and verify it against `correction.digest`.
pub async fn read_correction_artifact(store: &dyn ArtifactStore) -> Result<CorrectionLog> {
    let json = store.read(&ArtifactName::CorrectionLog).await?;
    let expected = store.read_text(&ArtifactName::CorrectionDigest).await?;
    let actual = digest_hex(&json);
    if expected.trim() != actual {
        return Err(StudioError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}
