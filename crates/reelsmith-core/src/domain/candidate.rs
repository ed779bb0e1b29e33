//! Candidate source: one complete generated animation program.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*(?:python|py)?[ \t]*\r?\n(.*?)```").expect("fence pattern is valid")
    })
}

fn scene_class_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^class\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*[A-Za-z0-9_.]*Scene\s*\)")
            .expect("scene class pattern is valid")
    })
}

/// Program text produced by one generation attempt.
///
/// Always a whole program, never a patch against a previous attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSource {
    pub code: String,
    /// First scene class declared in `code`, if any.
    pub entry_point: Option<String>,
}

impl CandidateSource {
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        let entry_point = scene_class_regex()
            .captures(&code)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        Self { code, entry_point }
    }

    /// Build a candidate from raw model output.
    ///
    /// When the output contains a fenced code block the largest block is used,
    /// otherwise the whole text. Returns `None` when nothing but whitespace remains.
    pub fn from_model_output(output: &str) -> Option<Self> {
        let code = fence_regex()
            .captures_iter(output)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .max_by_key(|block| block.len())
            .unwrap_or(output)
            .trim();
        if code.is_empty() {
            return None;
        }
        Some(Self::new(format!("{code}\n")))
    }

    /// Whether `entry` is declared as a class in this program.
    pub fn declares(&self, entry: &str) -> bool {
        let pattern = format!(r"(?m)^class\s+{}\s*[(:]", regex::escape(entry));
        Regex::new(&pattern)
            .map(|re| re.is_match(&self.code))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_fenced_block_and_entry_point() {
        let output = "Sure! Here is the code:\n```python\nfrom manim import *\n\nclass DerivativeScene(Scene):\n    def construct(self):\n        self.wait()\n```\nEnjoy.";
        let candidate = CandidateSource::from_model_output(output).unwrap();
        assert!(candidate.code.starts_with("from manim import *"));
        assert!(!candidate.code.contains("```"));
        assert_eq!(candidate.entry_point.as_deref(), Some("DerivativeScene"));
    }

    #[test]
    fn test_unfenced_output_used_verbatim() {
        let output = "from manim import *\nclass Intro(MovingCameraScene):\n    pass\n";
        let candidate = CandidateSource::from_model_output(output).unwrap();
        assert_eq!(candidate.entry_point.as_deref(), Some("Intro"));
    }

    #[test]
    fn test_largest_block_wins() {
        let output = "```\npip install manim\n```\n```python\nfrom manim import *\nclass Big(Scene):\n    pass\n```";
        let candidate = CandidateSource::from_model_output(output).unwrap();
        assert_eq!(candidate.entry_point.as_deref(), Some("Big"));
    }

    #[test]
    fn test_blank_output_is_none() {
        assert!(CandidateSource::from_model_output("  \n ").is_none());
        assert!(CandidateSource::from_model_output("```python\n\n```").is_none());
    }

    #[test]
    fn test_declares() {
        let candidate = CandidateSource::new("class Intro(Scene):\n    pass\n");
        assert!(candidate.declares("Intro"));
        assert!(!candidate.declares("Outro"));
        assert!(!candidate.declares("Intr"));
    }

    #[test]
    fn test_no_scene_class() {
        let candidate = CandidateSource::new("print('hello')\n");
        assert!(candidate.entry_point.is_none());
    }
}
