//! Structured lifecycle events for pipeline runs.
//!
//! Every event is an `info!`/`warn!` record with an `event` field, so log
//! pipelines can filter on it (`RUST_LOG=reelsmith_core=info`).

use tracing::{info, warn, Span};

use crate::domain::ErrorClass;

/// Span tagging everything inside one run with its `run_id`.
///
/// Attach with `tracing::Instrument::instrument` so it survives `.await` points.
pub fn run_span(run_id: &str) -> Span {
    tracing::info_span!("reelsmith.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, topic: &str, language: &str) {
    info!(event = "run.started", run_id = %run_id, topic = %topic, language = %language);
}

pub fn emit_phase_entered(run_id: &str, phase: &str, progress: u8) {
    info!(event = "phase.entered", run_id = %run_id, phase = %phase, progress = progress);
}

pub fn emit_attempt_started(run_id: &str, attempt: u32, max: u32) {
    info!(event = "attempt.started", run_id = %run_id, attempt = attempt, max = max);
}

/// `error_class` is `None` for a review rejection of a clean render.
pub fn emit_attempt_rejected(run_id: &str, attempt: u32, error_class: Option<ErrorClass>) {
    let class = error_class.map(|c| c.as_str()).unwrap_or("review");
    warn!(event = "attempt.rejected", run_id = %run_id, attempt = attempt, class = %class);
}

pub fn emit_loop_finished(run_id: &str, accepted: bool, attempts_used: u32) {
    info!(
        event = "loop.finished",
        run_id = %run_id,
        accepted = accepted,
        attempts_used = attempts_used,
    );
}

pub fn emit_run_finished(run_id: &str, final_video: &str, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        final_video = %final_video,
        duration_ms = duration_ms,
    );
}

pub fn emit_run_failed(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", run_id = %run_id, error = %error);
}
