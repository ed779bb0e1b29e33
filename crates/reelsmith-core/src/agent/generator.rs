//! Generation agent: visual direction (+ at most one failure report) → program.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::{complete_with_retry, InfraRetryPolicy};
use crate::artifact::{ArtifactName, ArtifactStore};
use crate::domain::{CandidateSource, FailureReport, GenerationError, ScriptArtifact, ScriptError};
use crate::handbook::{Catalog, Handbook};
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel};

pub struct GenerationAgent {
    model: Arc<dyn LanguageModel>,
    handbook: Handbook,
    catalog: Catalog,
    store: Arc<dyn ArtifactStore>,
    infra_policy: InfraRetryPolicy,
}

impl GenerationAgent {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        catalog: Catalog,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            model,
            handbook: Handbook::manim_community(),
            catalog,
            store,
            infra_policy: InfraRetryPolicy::default(),
        }
    }

    pub fn with_handbook(mut self, handbook: Handbook) -> Self {
        self.handbook = handbook;
        self
    }

    pub fn with_infra_policy(mut self, policy: InfraRetryPolicy) -> Self {
        self.infra_policy = policy;
        self
    }

    /// Build the prompt. A prior report is embedded verbatim; earlier reports
    /// and the previous program are never included.
    pub fn build_request(
        &self,
        script: &ScriptArtifact,
        prior: Option<&FailureReport>,
    ) -> CompletionRequest {
        let system = format!("{}\n\n{}", self.catalog.coder_role(), self.handbook.render());

        let mut user = String::new();
        if let Some(report) = prior {
            user.push_str(&self.catalog.retry_preamble(&report.text));
        }
        user.push_str(self.catalog.coder_task());
        user.push_str("\n\n[VISUAL SCRIPT]\n");
        user.push_str(script.visual.raw.trim());
        user.push('\n');
        if let Some(total) = script.estimated_duration_secs() {
            user.push_str(&format!("\nPlanned total duration: {total:.0}s\n"));
        }

        CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
    }

    /// Produce a complete candidate program and persist it at the canonical name.
    #[instrument(skip(self, script, prior), fields(retry = prior.is_some()))]
    pub async fn generate(
        &self,
        script: &ScriptArtifact,
        prior: Option<&FailureReport>,
    ) -> Result<CandidateSource, GenerationError> {
        if script.visual.raw.trim().is_empty() {
            return Err(GenerationError::InvalidScript(ScriptError::EmptyVisual));
        }

        let request = self.build_request(script, prior);
        let completion = complete_with_retry(self.model.as_ref(), &request, &self.infra_policy)
            .await
            .map_err(|(attempts, source)| GenerationError::Model { attempts, source })?;

        let candidate = CandidateSource::from_model_output(&completion.content)
            .ok_or(GenerationError::EmptyCandidate)?;

        self.store
            .write_text(&ArtifactName::CandidateSource, &candidate.code)
            .await?;
        debug!(
            entry_point = candidate.entry_point.as_deref().unwrap_or("<none>"),
            bytes = candidate.code.len(),
            "candidate generated"
        );

        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::memory::MemoryArtifactStore;
    use crate::domain::ErrorClass;
    use crate::fakes::ScriptedModel;
    use crate::handbook::Locale;
    use crate::llm::LlmError;

    const SCRIPT: &str = "[VISUAL SCRIPT]\nSCENE 1 (10s): A circle appears\nSCENE 2 (20s): It turns into a square\n\n[VOICEOVER SCRIPT]\nShapes can change.\n";

    const PROGRAM: &str = "```python\nfrom manim import *\n\nclass ShapeScene(Scene):\n    def construct(self):\n        self.play(Create(Circle()))\n```";

    fn agent(model: Arc<ScriptedModel>, store: Arc<MemoryArtifactStore>) -> GenerationAgent {
        GenerationAgent::new(model, Catalog::new(Locale::En), store).with_infra_policy(
            InfraRetryPolicy {
                max_retries: 1,
                backoff_base_ms: 1,
            },
        )
    }

    #[tokio::test]
    async fn generate_persists_candidate() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(PROGRAM.into())]));
        let store = Arc::new(MemoryArtifactStore::new());
        let script = ScriptArtifact::parse(SCRIPT).unwrap();

        let candidate = agent(model, store.clone())
            .generate(&script, None)
            .await
            .unwrap();

        assert_eq!(candidate.entry_point.as_deref(), Some("ShapeScene"));
        let stored = store.read_text(&ArtifactName::CandidateSource).await.unwrap();
        assert_eq!(stored, candidate.code);
        assert!(!stored.contains("```"));
    }

    #[tokio::test]
    async fn prompt_contains_only_given_report() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let store = Arc::new(MemoryArtifactStore::new());
        let script = ScriptArtifact::parse(SCRIPT).unwrap();
        let agent = agent(model, store);

        let report = FailureReport {
            attempt: 3,
            error_class: Some(ErrorClass::AttributeError),
            hint: None,
            text: "AttributeError at attempt 3".into(),
        };
        let request = agent.build_request(&script, Some(&report));
        let user = request.user_text();
        assert!(user.contains("AttributeError at attempt 3"));
        assert!(user.contains("A circle appears"));
        assert!(user.contains("Planned total duration: 30s"));

        let first = agent.build_request(&script, None).user_text();
        assert!(!first.contains("ERROR REPORT"));
    }

    #[tokio::test]
    async fn blank_output_is_empty_candidate() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("```python\n\n```".into())]));
        let store = Arc::new(MemoryArtifactStore::new());
        let script = ScriptArtifact::parse(SCRIPT).unwrap();

        let err = agent(model, store.clone())
            .generate(&script, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyCandidate));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn model_failure_reports_attempts() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(LlmError::Network("down".into())),
            Err(LlmError::Network("down".into())),
        ]));
        let store = Arc::new(MemoryArtifactStore::new());
        let script = ScriptArtifact::parse(SCRIPT).unwrap();

        let err = agent(model, store).generate(&script, None).await.unwrap_err();
        match err {
            GenerationError::Model { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected Model error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried_with_a_custom_handbook() {
        let model = Arc::new(
            ScriptedModel::new(vec![Err(LlmError::Network("reset".into()))]).then_repeat(PROGRAM),
        );
        let store = Arc::new(MemoryArtifactStore::new());
        let script = ScriptArtifact::parse(SCRIPT).unwrap();
        let mut handbook = Handbook::manim_community();
        handbook.rules.push("Keep every scene under ten seconds.".into());

        let candidate = agent(model.clone(), store)
            .with_handbook(handbook)
            .generate(&script, None)
            .await
            .unwrap();

        assert_eq!(candidate.entry_point.as_deref(), Some("ShapeScene"));
        assert_eq!(model.calls(), 2);
        let requests = model.requests();
        assert!(requests[1].messages[0].content.contains("Keep every scene under ten seconds."));
    }
}
