//! Voice synthesis for the narration track.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::SpeechError;
use crate::media::{needs_adjustment, MediaTools};

/// Longest text the translate endpoint accepts per request.
pub const MAX_CHUNK_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceLanguage {
    Code(String),
    /// Resolved to the configured default; no detection is attempted.
    Auto,
}

impl VoiceLanguage {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => VoiceLanguage::Auto,
            code => VoiceLanguage::Code(code.to_string()),
        }
    }

    pub fn resolve<'a>(&'a self, default: &'a str) -> &'a str {
        match self {
            VoiceLanguage::Code(code) => code,
            VoiceLanguage::Auto => default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub language: VoiceLanguage,
    pub slow: bool,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, language: VoiceLanguage) -> Self {
        Self {
            text: text.into(),
            language,
            slow: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedAudio {
    pub path: PathBuf,
    pub duration_secs: Option<f64>,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        request: &SpeechRequest,
        output: &Path,
    ) -> Result<SynthesizedAudio, SpeechError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    pub endpoint: String,
    pub default_language: String,
    pub slow: bool,
    /// Tempo applied after synthesis, within [0.5, 2.0].
    pub rate: f64,
    pub timeout_secs: u64,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://translate.google.com/translate_tts".to_string(),
            default_language: "en".to_string(),
            slow: false,
            rate: 1.0,
            timeout_secs: 30,
        }
    }
}

/// Split `text` into chunks of at most `max` characters, breaking at whitespace.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        // Hard-split words longer than a chunk.
        while word.chars().count() > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max).collect();
            word = word.chars().skip(max).collect();
            chunks.push(head);
        }
        if word.is_empty() {
            continue;
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Google Translate TTS-compatible synthesizer.
pub struct TranslateTtsSynthesizer {
    client: Client,
    settings: SpeechSettings,
    media: Arc<dyn MediaTools>,
}

impl TranslateTtsSynthesizer {
    pub fn new(settings: SpeechSettings, media: Arc<dyn MediaTools>) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent("Mozilla/5.0")
            .build()?;
        Ok(Self {
            client,
            settings,
            media,
        })
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        index: usize,
        total: usize,
        lang: &str,
        slow: bool,
    ) -> Result<Vec<u8>, SpeechError> {
        let speed = if slow { "0.24" } else { "1" };
        let total = total.to_string();
        let index = index.to_string();
        let textlen = chunk.chars().count().to_string();
        let response = self
            .client
            .get(&self.settings.endpoint)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", lang),
                ("q", chunk),
                ("ttsspeed", speed),
                ("total", total.as_str()),
                ("idx", index.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn write_output(&self, audio: &[u8], output: &Path) -> Result<(), SpeechError> {
        let rate = self.settings.rate;
        if !needs_adjustment(rate) {
            tokio::fs::write(output, audio).await?;
            return Ok(());
        }

        // Raw audio lives in a temp file that is removed when `raw` drops,
        // whether or not re-timing succeeds.
        let dir = output.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let mut raw = tempfile::Builder::new()
            .prefix("voice-raw-")
            .suffix(".mp3")
            .tempfile_in(dir)?;
        raw.write_all(audio)?;
        raw.flush()?;

        self.media.retime_audio(raw.path(), output, rate).await?;
        Ok(())
    }
}

#[async_trait]
impl SpeechSynthesizer for TranslateTtsSynthesizer {
    #[instrument(skip(self, request), fields(chars = request.text.len()))]
    async fn synthesize(
        &self,
        request: &SpeechRequest,
        output: &Path,
    ) -> Result<SynthesizedAudio, SpeechError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(SpeechError::EmptyText);
        }
        let lang = request.language.resolve(&self.settings.default_language);
        let slow = request.slow || self.settings.slow;

        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        let mut audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            audio.extend(self.fetch_chunk(chunk, index, chunks.len(), lang, slow).await?);
        }
        debug!(chunks = chunks.len(), bytes = audio.len(), lang, "speech fetched");

        self.write_output(&audio, output).await?;

        let duration_secs = match self.media.probe_duration(output).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                warn!(error = %e, "could not probe voiceover duration");
                None
            }
        };

        Ok(SynthesizedAudio {
            path: output.to_path_buf(),
            duration_secs,
        })
    }
}
