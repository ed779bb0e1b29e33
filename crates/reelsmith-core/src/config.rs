//! Studio configuration: TOML file, environment overrides, validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::InfraRetryPolicy;
use crate::correction::CorrectionPolicy;
use crate::domain::ConfigError;
use crate::handbook::Locale;
use crate::llm::ModelSettings;
use crate::media::{MediaSettings, MAX_SPEED, MIN_SPEED};
use crate::oracle::DEFAULT_REPORT_LIMIT;
use crate::render::RenderSettings;
use crate::speech::SpeechSettings;

/// Model settings per role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// Narration scripts.
    pub creative: ModelSettings,
    /// Animation programs.
    pub coder: ModelSettings,
    /// Render review.
    pub reviewer: ModelSettings,
    /// Endpoint retries with backoff, separate from the correction budget.
    pub infra_retry: InfraRetryPolicy,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            creative: ModelSettings::default().with_temperature(0.7),
            coder: ModelSettings::default()
                .with_model("gpt-4o")
                .with_temperature(0.2),
            reviewer: ModelSettings::default().with_temperature(0.0),
            infra_retry: InfraRetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSection {
    /// Accept every clean render without asking the reviewer model.
    pub auto_approve: bool,
    /// Per-stream character cap for failure reports.
    pub report_limit: usize,
}

impl Default for ReviewSection {
    fn default() -> Self {
        Self {
            auto_approve: false,
            report_limit: DEFAULT_REPORT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Root directory; each job gets `<workspace>/<job id>`.
    pub workspace: PathBuf,
    pub locale: Locale,
    pub llm: LlmSection,
    pub review: ReviewSection,
    pub render: RenderSettings,
    pub correction: CorrectionPolicy,
    pub media: MediaSettings,
    pub speech: SpeechSettings,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("workspace"),
            locale: Locale::default(),
            llm: LlmSection::default(),
            review: ReviewSection::default(),
            render: RenderSettings::default(),
            correction: CorrectionPolicy::default(),
            media: MediaSettings::default(),
            speech: SpeechSettings::default(),
        }
    }
}

impl StudioConfig {
    /// Read `path` (or defaults), apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                debug!(path = %path.display(), "loaded config file");
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `REELSMITH_*` overrides read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("REELSMITH_WORKSPACE") {
            self.workspace = PathBuf::from(dir);
        }
        if let Some(url) = get("REELSMITH_LLM_BASE_URL") {
            for settings in self.models_mut() {
                settings.base_url = url.clone();
            }
        }
        if let Some(key) = get("REELSMITH_LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            for settings in self.models_mut() {
                if settings.api_key.is_none() {
                    settings.api_key = Some(key.clone());
                }
            }
        }
        if let Some(model) = get("REELSMITH_CODER_MODEL") {
            self.llm.coder.model = model;
        }
        if let Some(value) = get("REELSMITH_MAX_RETRIES") {
            self.correction.max_retries = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("REELSMITH_MAX_RETRIES is not a number: {value:?}"))
            })?;
        }
        if let Some(bin) = get("REELSMITH_MANIM_BIN") {
            self.render.binary = bin;
        }
        if let Some(bin) = get("REELSMITH_FFMPEG_BIN") {
            self.media.ffmpeg = bin;
        }
        if let Some(bin) = get("REELSMITH_FFPROBE_BIN") {
            self.media.ffprobe = bin;
        }
        if let Some(locale) = get("REELSMITH_LOCALE") {
            self.locale = locale
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("unknown locale: {locale:?}")))?;
        }
        Ok(())
    }

    fn models_mut(&mut self) -> [&mut ModelSettings; 3] {
        [
            &mut self.llm.creative,
            &mut self.llm.coder,
            &mut self.llm.reviewer,
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.correction.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "correction.max_retries must be at least 1".into(),
            ));
        }
        let binaries = [
            ("render.binary", &self.render.binary),
            ("media.ffmpeg", &self.media.ffmpeg),
            ("media.ffprobe", &self.media.ffprobe),
        ];
        for (field, value) in binaries {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speech.rate) {
            return Err(ConfigError::Invalid(format!(
                "speech.rate must be within [{MIN_SPEED}, {MAX_SPEED}], got {}",
                self.speech.rate
            )));
        }
        if self.render.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "render.timeout_secs must be positive".into(),
            ));
        }
        if self.review.report_limit == 0 {
            return Err(ConfigError::Invalid(
                "review.report_limit must be positive".into(),
            ));
        }
        Ok(())
    }
}
