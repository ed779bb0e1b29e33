//! Narration script: topic input and the three-section script artifact.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::ScriptError;

/// Subject of a video. Immutable once the pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    pub fn new(topic: impl Into<String>) -> Result<Self, ScriptError> {
        let topic = topic.into();
        let trimmed = topic.trim();
        if trimmed.is_empty() {
            return Err(ScriptError::EmptyTopic);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Topic {
    type Error = ScriptError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Topic::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One scene of the visual direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub index: u32,
    pub duration_secs: f64,
    pub description: String,
}

/// The `[VISUAL SCRIPT]` section: raw text plus the scenes that could be parsed from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualDirection {
    pub raw: String,
    pub scenes: Vec<Scene>,
}

/// Script produced by the narration stage. Read-only for everything downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptArtifact {
    pub visual: VisualDirection,
    pub narration: String,
    pub timing: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Visual,
    Narration,
    Timing,
}

const VISUAL_HEADER: &str = "[VISUAL SCRIPT]";
const NARRATION_HEADER: &str = "[VOICEOVER SCRIPT]";
const TIMING_HEADER: &str = "[TIMING]";

fn scene_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*[-*]?\s*SCENE\s+(\d+)\s*\(\s*(\d+(?:\.\d+)?)\s*s(?:ec(?:onds?)?)?\s*\)\s*:?\s*(.*)$")
            .expect("scene pattern is valid")
    })
}

/// Recognise a section header line, tolerating markdown decoration (`**`, `##`)
/// and a trailing colon.
fn header_of(line: &str) -> Option<Section> {
    let cleaned: String = line
        .trim()
        .trim_matches(|c| matches!(c, '*' | '#' | ' ' | ':'))
        .to_uppercase();
    match cleaned.as_str() {
        VISUAL_HEADER => Some(Section::Visual),
        NARRATION_HEADER => Some(Section::Narration),
        TIMING_HEADER => Some(Section::Timing),
        _ => None,
    }
}

fn parse_scene(line: &str) -> Option<Scene> {
    let caps = scene_regex().captures(line)?;
    Some(Scene {
        index: caps.get(1)?.as_str().parse().ok()?,
        duration_secs: caps.get(2)?.as_str().parse().ok()?,
        description: caps.get(3).map(|m| m.as_str().trim().to_string())?,
    })
}

impl ScriptArtifact {
    /// Parse model output into the three named sections.
    ///
    /// Text before the first header and markdown fence lines are ignored.
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let mut current: Option<Section> = None;
        let mut visual = Vec::new();
        let mut narration = Vec::new();
        let mut timing = Vec::new();
        let mut saw_narration = false;
        let mut saw_timing = false;

        for line in text.lines() {
            if line.trim_start().starts_with("```") {
                continue;
            }
            if let Some(section) = header_of(line) {
                match section {
                    Section::Narration => saw_narration = true,
                    Section::Timing => saw_timing = true,
                    Section::Visual => {}
                }
                current = Some(section);
                continue;
            }
            match current {
                Some(Section::Visual) => visual.push(line),
                Some(Section::Narration) => narration.push(line),
                Some(Section::Timing) => timing.push(line),
                None => {}
            }
        }

        let raw = visual.join("\n").trim().to_string();
        if raw.is_empty() {
            return Err(ScriptError::EmptyVisual);
        }
        if !saw_narration {
            return Err(ScriptError::MissingNarration);
        }

        let scenes = visual.iter().filter_map(|l| parse_scene(l)).collect();
        let narration = narration.join("\n").trim().to_string();
        let timing = if saw_timing {
            Some(timing.join("\n").trim().to_string()).filter(|t| !t.is_empty())
        } else {
            None
        };

        Ok(Self {
            visual: VisualDirection { raw, scenes },
            narration,
            timing,
        })
    }

    /// Number of whitespace-separated words in the narration.
    pub fn narration_word_count(&self) -> usize {
        self.narration.split_whitespace().count()
    }

    /// Sum of parsed scene durations, if any scene carried one.
    pub fn estimated_duration_secs(&self) -> Option<f64> {
        if self.visual.scenes.is_empty() {
            return None;
        }
        Some(self.visual.scenes.iter().map(|s| s.duration_secs).sum())
    }

    /// Render back into the canonical three-section layout.
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "{VISUAL_HEADER}\n{}\n\n{NARRATION_HEADER}\n{}\n",
            self.visual.raw, self.narration
        );
        if let Some(timing) = &self.timing {
            out.push_str(&format!("\n{TIMING_HEADER}\n{timing}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Here is your script:\n\
```\n\
[VISUAL SCRIPT]\n\
SCENE 1 (10s): Title card with the power rule\n\
SCENE 2 (15.5s): Plot x^2 and its tangent line\n\
SCENE 3 (20 seconds): Show d/dx sin(x) = cos(x)\n\
\n\
[VOICEOVER SCRIPT]\n\
Derivatives measure how fast things change.\n\
Let's start with the power rule.\n\
\n\
[TIMING]\n\
- Total video duration: ~60s\n\
```\n";

    #[test]
    fn test_parse_sections() {
        let script = ScriptArtifact::parse(SAMPLE).unwrap();
        assert_eq!(script.visual.scenes.len(), 3);
        assert_eq!(script.visual.scenes[0].index, 1);
        assert_eq!(script.visual.scenes[1].duration_secs, 15.5);
        assert_eq!(
            script.visual.scenes[2].description,
            "Show d/dx sin(x) = cos(x)"
        );
        assert!(script.narration.starts_with("Derivatives measure"));
        assert_eq!(script.timing.as_deref(), Some("- Total video duration: ~60s"));
    }

    #[test]
    fn test_estimated_duration_and_word_count() {
        let script = ScriptArtifact::parse(SAMPLE).unwrap();
        assert_eq!(script.estimated_duration_secs(), Some(45.5));
        assert_eq!(script.narration_word_count(), 12);
    }

    #[test]
    fn test_markdown_headers_are_recognised() {
        let text = "**[Visual Script]**\nA circle grows.\n## [VOICEOVER SCRIPT]\nHello.";
        let script = ScriptArtifact::parse(text).unwrap();
        assert_eq!(script.visual.raw, "A circle grows.");
        assert!(script.visual.scenes.is_empty());
        assert_eq!(script.narration, "Hello.");
        assert!(script.timing.is_none());
    }

    #[test]
    fn test_headers_with_trailing_colon_are_recognised() {
        let text = "**[VISUAL SCRIPT]:**\nSCENE 1 (10s): A circle\n\n[VOICEOVER SCRIPT]:\nHello there.\n";
        let script = ScriptArtifact::parse(text).unwrap();
        assert_eq!(script.visual.scenes.len(), 1);
        assert_eq!(script.visual.scenes[0].description, "A circle");
        assert_eq!(script.narration, "Hello there.");
        assert_eq!(header_of("## [TIMING]: "), Some(Section::Timing));
    }

    #[test]
    fn test_empty_visual_rejected() {
        let text = "[VISUAL SCRIPT]\n\n[VOICEOVER SCRIPT]\nHello.";
        assert_eq!(ScriptArtifact::parse(text), Err(ScriptError::EmptyVisual));
    }

    #[test]
    fn test_missing_narration_rejected() {
        let text = "[VISUAL SCRIPT]\nSCENE 1 (5s): dot";
        assert_eq!(
            ScriptArtifact::parse(text),
            Err(ScriptError::MissingNarration)
        );
    }

    #[test]
    fn test_to_text_reparses() {
        let script = ScriptArtifact::parse(SAMPLE).unwrap();
        let again = ScriptArtifact::parse(&script.to_text()).unwrap();
        assert_eq!(script, again);
    }

    #[test]
    fn test_topic_trims_and_rejects_blank() {
        assert_eq!(Topic::new("  Basic Derivatives ").unwrap().as_str(), "Basic Derivatives");
        assert_eq!(Topic::new("   "), Err(ScriptError::EmptyTopic));
    }
}
