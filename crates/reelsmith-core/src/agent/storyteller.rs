//! Narration stage: topic → three-section script.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{complete_with_retry, InfraRetryPolicy};
use crate::artifact::{ArtifactName, ArtifactStore};
use crate::domain::{GenerationError, JobRequest, Result, ScriptArtifact};
use crate::handbook::{narration_word_band, Catalog};
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel};

pub struct Storyteller {
    model: Arc<dyn LanguageModel>,
    catalog: Catalog,
    store: Arc<dyn ArtifactStore>,
    infra_policy: InfraRetryPolicy,
}

impl Storyteller {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        catalog: Catalog,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            model,
            catalog,
            store,
            infra_policy: InfraRetryPolicy::default(),
        }
    }

    pub fn with_infra_policy(mut self, policy: InfraRetryPolicy) -> Self {
        self.infra_policy = policy;
        self
    }

    fn build_request(&self, request: &JobRequest) -> CompletionRequest {
        CompletionRequest::new(vec![
            ChatMessage::system(self.catalog.storyteller_role()),
            ChatMessage::user(self.catalog.storyteller_task(
                request.topic.as_str(),
                &request.language,
                request.duration_minutes,
            )),
        ])
    }

    /// Write, parse and persist the script for `request`.
    #[instrument(skip(self, request), fields(topic = %request.topic))]
    pub async fn write_script(&self, request: &JobRequest) -> Result<ScriptArtifact> {
        let completion =
            complete_with_retry(self.model.as_ref(), &self.build_request(request), &self.infra_policy)
                .await
                .map_err(|(attempts, source)| GenerationError::Model { attempts, source })?;

        let script = ScriptArtifact::parse(&completion.content)?;
        self.store
            .write_text(&ArtifactName::Script, &script.to_text())
            .await?;

        let words = script.narration_word_count();
        let (lo, hi) = narration_word_band(request.duration_minutes);
        if words < lo || words > hi {
            warn!(words, lo, hi, "narration length outside target band");
        }
        info!(
            scenes = script.visual.scenes.len(),
            words,
            planned_secs = script.estimated_duration_secs().unwrap_or_default(),
            "script written"
        );

        Ok(script)
    }
}
