//! Render quality tiers and per-render settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::Resolution;

/// Frame rates the engine is asked to render at; anything else falls back.
pub const SUPPORTED_FPS: [u32; 3] = [15, 30, 60];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[serde(alias = "l")]
    Low,
    #[serde(alias = "m")]
    Medium,
    #[default]
    #[serde(alias = "h")]
    High,
    #[serde(alias = "p")]
    VeryHigh,
    #[serde(alias = "k")]
    Ultra,
}

impl Quality {
    /// Single-letter engine quality flag.
    pub fn flag(&self) -> char {
        match self {
            Quality::Low => 'l',
            Quality::Medium => 'm',
            Quality::High => 'h',
            Quality::VeryHigh => 'p',
            Quality::Ultra => 'k',
        }
    }

    pub fn resolution(&self) -> Resolution {
        let (width, height) = match self {
            Quality::Low => (854, 480),
            Quality::Medium => (1280, 720),
            Quality::High => (1920, 1080),
            Quality::VeryHigh => (2560, 1440),
            Quality::Ultra => (3840, 2160),
        };
        Resolution { width, height }
    }

    pub fn default_fps(&self) -> u32 {
        match self {
            Quality::Low => 15,
            Quality::Medium => 30,
            Quality::High | Quality::VeryHigh | Quality::Ultra => 60,
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(Quality::Low),
            "m" | "medium" => Ok(Quality::Medium),
            "h" | "high" => Ok(Quality::High),
            "p" | "veryhigh" | "very_high" => Ok(Quality::VeryHigh),
            "k" | "ultra" | "4k" => Ok(Quality::Ultra),
            other => Err(format!("unknown quality tier: {other}")),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
            Quality::VeryHigh => "veryhigh",
            Quality::Ultra => "ultra",
        })
    }
}

/// Quality and frame rate for one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderConfig {
    pub quality: Quality,
    pub fps: Option<u32>,
}

impl RenderConfig {
    pub fn new(quality: Quality) -> Self {
        Self { quality, fps: None }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Requested fps when supported, otherwise the tier default.
    pub fn effective_fps(&self) -> u32 {
        match self.fps {
            Some(fps) if SUPPORTED_FPS.contains(&fps) => fps,
            _ => self.quality.default_fps(),
        }
    }
}

/// Renderer process settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub binary: String,
    pub quality: Quality,
    pub fps: Option<u32>,
    /// Per-attempt wall-clock limit.
    pub timeout_secs: u64,
    /// Entry point used when a candidate declares no scene class.
    pub entry_point_fallback: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            binary: "manim".to_string(),
            quality: Quality::High,
            fps: Some(30),
            timeout_secs: 600,
            entry_point_fallback: "MainScene".to_string(),
        }
    }
}

impl RenderSettings {
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            quality: self.quality,
            fps: self.fps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_fps_falls_back_to_tier_default() {
        assert_eq!(RenderConfig::new(Quality::Low).with_fps(24).effective_fps(), 15);
        assert_eq!(RenderConfig::new(Quality::Medium).with_fps(0).effective_fps(), 30);
        assert_eq!(RenderConfig::new(Quality::Ultra).with_fps(144).effective_fps(), 60);
        assert_eq!(RenderConfig::new(Quality::High).effective_fps(), 60);
    }

    #[test]
    fn supported_fps_is_kept() {
        for fps in SUPPORTED_FPS {
            assert_eq!(RenderConfig::new(Quality::Low).with_fps(fps).effective_fps(), fps);
        }
    }

    #[test]
    fn tier_table() {
        assert_eq!(Quality::Low.flag(), 'l');
        assert_eq!(Quality::VeryHigh.flag(), 'p');
        assert_eq!(Quality::Ultra.resolution().to_string(), "3840x2160");
        assert_eq!(Quality::Medium.resolution().to_string(), "1280x720");
    }

    #[test]
    fn quality_parse_and_serde_aliases() {
        assert_eq!("k".parse::<Quality>().unwrap(), Quality::Ultra);
        assert_eq!("VeryHigh".parse::<Quality>().unwrap(), Quality::VeryHigh);
        assert!("cinema".parse::<Quality>().is_err());

        let q: Quality = serde_json::from_str("\"h\"").unwrap();
        assert_eq!(q, Quality::High);
        assert_eq!(serde_json::to_string(&Quality::VeryHigh).unwrap(), "\"veryhigh\"");
    }
}
