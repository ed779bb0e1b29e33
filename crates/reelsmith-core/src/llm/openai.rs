//! OpenAI-compatible chat completions client.
//!
//! Works with any endpoint that speaks `POST {base_url}/chat/completions`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, Completion, CompletionRequest, LanguageModel, LlmError, ModelSettings};

pub struct OpenAiCompatibleModel {
    client: Client,
    settings: ModelSettings,
}

impl OpenAiCompatibleModel {
    pub fn new(settings: ModelSettings) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

/// Request overrides win over the configured defaults.
fn api_request<'a>(settings: &'a ModelSettings, request: &'a CompletionRequest) -> ApiRequest<'a> {
    ApiRequest {
        model: &settings.model,
        messages: &request.messages,
        temperature: request.temperature.unwrap_or(settings.temperature),
        max_tokens: request.max_tokens.unwrap_or(settings.max_tokens),
    }
}

fn map_status(status: u16, body: String) -> LlmError {
    match status {
        429 => LlmError::RateLimited,
        401 | 403 => LlmError::Authentication,
        _ => LlmError::Api {
            status,
            message: body,
        },
    }
}

fn extract_content(response: ApiResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(LlmError::EmptyResponse)
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let body = api_request(&self.settings, &request);

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = self.settings.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.bearer_auth(key);
        }

        debug!(model = %self.settings.model, messages = request.messages.len(), "chat completion");
        let response = req
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), text));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        let model = if parsed.model.is_empty() {
            self.settings.model.clone()
        } else {
            parsed.model.clone()
        };
        let content = extract_content(parsed)?;

        Ok(Completion { content, model })
    }

    fn name(&self) -> &str {
        &self.settings.model
    }
}
