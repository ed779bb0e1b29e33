//! Verification oracle: render outcome → accept, or reject with one failure report.
//!
//! A successful render is not enough; a reviewer pass over the rendered
//! artifact's metadata must also approve it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::agent::{complete_with_retry, InfraRetryPolicy};
use crate::domain::{FailureReport, RenderFailure, RenderOutcome, RenderSuccess, ScriptArtifact};
use crate::handbook::Catalog;
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel, LlmError};

/// Default cap on each embedded output stream, in characters.
pub const DEFAULT_REPORT_LIMIT: usize = 4000;

const TRUNCATION_MARKER: &str = "...truncated...";

/// Internal decision, kept explicit instead of inferred from strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Approved { notes: Option<String> },
    Rejected { report: FailureReport, notes: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub accepted: bool,
    pub report: Option<FailureReport>,
    pub reviewer_notes: Option<String>,
}

impl From<Verdict> for VerificationResult {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Approved { notes } => Self {
                accepted: true,
                report: None,
                reviewer_notes: notes,
            },
            Verdict::Rejected { report, notes } => Self {
                accepted: false,
                report: Some(report),
                reviewer_notes: notes,
            },
        }
    }
}

/// Keep the last `limit` characters of `text`, prefixed by a marker when cut.
pub fn truncate_tail(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    if count <= limit {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - limit).collect();
    format!("{TRUNCATION_MARKER}\n{tail}")
}

/// Whole-word, case-insensitive approval token matcher.
///
/// A negation anywhere earlier in the same clause vetoes a token. Clauses end
/// at `,` `;` `.` `!` `?` or a line break; a colon does not end one.
#[derive(Debug, Clone)]
pub struct ApprovalMatcher {
    tokens: Vec<Vec<String>>,
    negations: Vec<String>,
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

impl ApprovalMatcher {
    pub fn new<'a>(
        tokens: impl IntoIterator<Item = &'a str>,
        negations: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            tokens: tokens.into_iter().map(words).filter(|t| !t.is_empty()).collect(),
            negations: negations.into_iter().map(|n| n.to_lowercase()).collect(),
        }
    }

    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self::new(
            catalog.approval_tokens().iter().copied(),
            catalog.negations().iter().copied(),
        )
    }

    fn negated(&self, clause: &[String], at: usize) -> bool {
        clause[..at].iter().any(|w| self.negations.contains(w))
    }

    fn clause_approves(&self, clause: &[String]) -> bool {
        self.tokens.iter().any(|token| {
            clause
                .windows(token.len())
                .enumerate()
                .any(|(at, window)| window == token.as_slice() && !self.negated(clause, at))
        })
    }

    pub fn is_approved(&self, text: &str) -> bool {
        text.split(|c: char| matches!(c, ',' | ';' | '.' | '!' | '?' | '\n'))
            .map(words)
            .any(|clause| self.clause_approves(&clause))
    }
}

/// Who reviews successful renders.
#[derive(Clone)]
pub enum Reviewer {
    Model(Arc<dyn LanguageModel>),
    /// Accept every successful render.
    AutoApprove,
}

pub struct VerificationOracle {
    reviewer: Reviewer,
    catalog: Catalog,
    matcher: ApprovalMatcher,
    report_limit: usize,
    infra_policy: InfraRetryPolicy,
}

impl VerificationOracle {
    pub fn new(reviewer: Reviewer, catalog: Catalog) -> Self {
        Self {
            reviewer,
            matcher: ApprovalMatcher::from_catalog(&catalog),
            catalog,
            report_limit: DEFAULT_REPORT_LIMIT,
            infra_policy: InfraRetryPolicy::default(),
        }
    }

    pub fn with_report_limit(mut self, limit: usize) -> Self {
        self.report_limit = limit;
        self
    }

    pub fn with_infra_policy(mut self, policy: InfraRetryPolicy) -> Self {
        self.infra_policy = policy;
        self
    }

    /// Report for a failed render: class, hint, then stderr and stdout (each capped).
    pub fn failure_report(&self, attempt: u32, failure: &RenderFailure) -> FailureReport {
        let hint = failure.error_class.remediation_hint();
        let mut text = format!(
            "Render attempt {attempt} failed.\nError class: {}\nHint: {hint}\n",
            failure.error_class
        );
        if let Some(code) = failure.exit_code {
            text.push_str(&format!("Exit code: {code}\n"));
        }
        text.push_str("STDERR:\n");
        text.push_str(&truncate_tail(failure.raw_stderr.trim_end(), self.report_limit));
        text.push_str("\nSTDOUT:\n");
        text.push_str(&truncate_tail(failure.raw_stdout.trim_end(), self.report_limit));
        text.push('\n');

        FailureReport {
            attempt,
            error_class: Some(failure.error_class),
            hint: Some(hint.to_string()),
            text,
        }
    }

    fn review_request(&self, success: &RenderSuccess, script: &ScriptArtifact) -> CompletionRequest {
        let mut user = format!(
            "Rendered video: {}\nResolution: {} at {} fps\nDuration: {}\n",
            success.artifact_ref.display(),
            success.resolution,
            success.fps,
            success
                .duration_secs
                .map(|d| format!("{d:.1}s"))
                .unwrap_or_else(|| "unknown".to_string()),
        );
        if let Some(planned) = script.estimated_duration_secs() {
            user.push_str(&format!("Planned duration: {planned:.0}s\n"));
        }
        user.push_str("\n[VISUAL SCRIPT]\n");
        if script.visual.scenes.is_empty() {
            user.push_str(&script.visual.raw);
            user.push('\n');
        } else {
            for scene in &script.visual.scenes {
                user.push_str(&format!(
                    "SCENE {} ({}s): {}\n",
                    scene.index, scene.duration_secs, scene.description
                ));
            }
        }
        CompletionRequest::new(vec![
            ChatMessage::system(self.catalog.reviewer_role()),
            ChatMessage::user(user),
        ])
        .with_temperature(0.0)
    }

    fn rejection(&self, attempt: u32, notes: &str) -> FailureReport {
        let mut text = self.catalog.not_approved().to_string();
        let notes = notes.trim();
        if !notes.is_empty() {
            text.push_str("\n\nReviewer notes:\n");
            text.push_str(&truncate_tail(notes, self.report_limit));
        }
        FailureReport {
            attempt,
            error_class: None,
            hint: None,
            text,
        }
    }

    /// Report for a rejected outcome without a reviewer pass.
    pub fn failure_report_for(&self, attempt: u32, outcome: &RenderOutcome) -> FailureReport {
        match outcome {
            RenderOutcome::Failure(failure) => self.failure_report(attempt, failure),
            RenderOutcome::Success(_) => self.rejection(attempt, ""),
        }
    }

    /// Decide on one attempt's outcome.
    pub async fn judge(
        &self,
        attempt: u32,
        outcome: &RenderOutcome,
        script: &ScriptArtifact,
    ) -> Result<Verdict, LlmError> {
        let success = match outcome {
            RenderOutcome::Failure(failure) => {
                return Ok(Verdict::Rejected {
                    report: self.failure_report(attempt, failure),
                    notes: None,
                })
            }
            RenderOutcome::Success(success) => success,
        };

        let model = match &self.reviewer {
            Reviewer::AutoApprove => return Ok(Verdict::Approved { notes: None }),
            Reviewer::Model(model) => model,
        };

        let request = self.review_request(success, script);
        let completion = complete_with_retry(model.as_ref(), &request, &self.infra_policy)
            .await
            .map_err(|(_, err)| err)?;
        let notes = completion.content;
        debug!(attempt, notes_len = notes.len(), "reviewer replied");

        if self.matcher.is_approved(&notes) {
            Ok(Verdict::Approved { notes: Some(notes) })
        } else {
            Ok(Verdict::Rejected {
                report: self.rejection(attempt, &notes),
                notes: Some(notes),
            })
        }
    }

    #[instrument(skip(self, outcome, script), fields(success = outcome.is_success()))]
    pub async fn verify(
        &self,
        attempt: u32,
        outcome: &RenderOutcome,
        script: &ScriptArtifact,
    ) -> Result<VerificationResult, LlmError> {
        Ok(self.judge(attempt, outcome, script).await?.into())
    }
}
