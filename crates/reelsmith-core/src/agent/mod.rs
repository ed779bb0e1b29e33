//! Model-backed agents: the narration storyteller and the code generator.
//!
//! Both share [`InfraRetryPolicy`], which retries transient endpoint failures
//! with exponential backoff. This budget is independent of the correction
//! loop's code-repair budget.

pub mod generator;
pub mod storyteller;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::{Completion, CompletionRequest, LanguageModel, LlmError};

pub use generator::GenerationAgent;
pub use storyteller::Storyteller;

/// Retry policy for language model infrastructure failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfraRetryPolicy {
    /// Maximum number of retries (0 = call once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for InfraRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }
}

impl InfraRetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(2u64.saturating_pow(retry - 1)))
    }
}

/// Call `model`, retrying transient failures. Returns the number of calls made
/// alongside the final error.
pub async fn complete_with_retry(
    model: &dyn LanguageModel,
    request: &CompletionRequest,
    policy: &InfraRetryPolicy,
) -> Result<Completion, (u32, LlmError)> {
    let max_calls = policy.max_retries + 1;

    for call in 1..=max_calls {
        match model.complete(request.clone()).await {
            Ok(completion) => return Ok(completion),
            Err(err) if err.is_transient() && call < max_calls => {
                let delay = policy.delay_for(call);
                warn!(
                    model = model.name(),
                    call,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient model failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err((call, err)),
        }
    }

    Err((max_calls, LlmError::EmptyResponse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedModel;
    use crate::llm::ChatMessage;

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("hi")])
    }

    #[test]
    fn backoff_doubles() {
        let policy = InfraRetryPolicy {
            max_retries: 3,
            backoff_base_ms: 100,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let model = ScriptedModel::new(vec![
            Err(LlmError::RateLimited),
            Err(LlmError::Network("reset".into())),
            Ok("done".into()),
        ]);
        let got = complete_with_retry(&model, &request(), &InfraRetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(got.content, "done");
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exhaust_with_call_count() {
        let model = ScriptedModel::new(vec![
            Err(LlmError::RateLimited),
            Err(LlmError::RateLimited),
            Err(LlmError::RateLimited),
            Ok("too late".into()),
        ]);
        let (calls, err) = complete_with_retry(&model, &request(), &InfraRetryPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(err, LlmError::RateLimited);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let model = ScriptedModel::new(vec![Err(LlmError::Authentication), Ok("x".into())]);
        let (calls, err) = complete_with_retry(&model, &request(), &InfraRetryPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(err, LlmError::Authentication);
    }
}
