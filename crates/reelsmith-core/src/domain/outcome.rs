//! Render outcomes and the failure reports derived from them.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Classified cause of a failed render attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    SyntaxError,
    ImportError,
    AttributeError,
    TypeError,
    ValueError,
    RuntimeError,
    Timeout,
    EntryPointNotFound,
    ToolNotFound,
    Unknown,
}

impl ErrorClass {
    /// Whether regenerating the program could plausibly fix this failure.
    ///
    /// A missing render engine is an environment problem, not a code problem.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, ErrorClass::ToolNotFound)
    }

    /// Fixed remediation hint surfaced in failure reports.
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            ErrorClass::SyntaxError => {
                "Check indentation, unbalanced brackets and unterminated strings; rewrite the file as valid Python 3."
            }
            ErrorClass::ImportError => {
                "Only import from `manim` (and `numpy` if needed); use `from manim import *` and avoid third-party modules."
            }
            ErrorClass::AttributeError => {
                "A method or property does not exist in this Manim version; replace it with the documented Manim Community API."
            }
            ErrorClass::TypeError => {
                "A call received wrong argument types or counts; check constructor signatures and pass mobjects, not values."
            }
            ErrorClass::ValueError => {
                "An argument value is out of range or malformed; check colours, coordinates, LaTeX strings and list lengths."
            }
            ErrorClass::RuntimeError => {
                "The scene failed while running; simplify updaters, avoid empty animations and make sure LaTeX compiles."
            }
            ErrorClass::Timeout => {
                "Rendering exceeded the time limit; shorten run_time values, remove infinite updaters and reduce object counts."
            }
            ErrorClass::EntryPointNotFound => {
                "Declare exactly one scene class, e.g. `class MainScene(Scene):` with a `construct(self)` method."
            }
            ErrorClass::ToolNotFound => {
                "The render engine is not installed or not on PATH; this cannot be fixed by changing the code."
            }
            ErrorClass::Unknown => {
                "Read the error output carefully, find the failing line and rewrite the program defensively."
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::SyntaxError => "SyntaxError",
            ErrorClass::ImportError => "ImportError",
            ErrorClass::AttributeError => "AttributeError",
            ErrorClass::TypeError => "TypeError",
            ErrorClass::ValueError => "ValueError",
            ErrorClass::RuntimeError => "RuntimeError",
            ErrorClass::Timeout => "Timeout",
            ErrorClass::EntryPointNotFound => "EntryPointNotFound",
            ErrorClass::ToolNotFound => "ToolNotFound",
            ErrorClass::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output resolution of a rendered video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSuccess {
    /// Canonical location of the rendered silent video.
    pub artifact_ref: PathBuf,
    /// `None` when the metadata probe could not read a duration.
    pub duration_secs: Option<f64>,
    pub resolution: Resolution,
    pub fps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderFailure {
    pub error_class: ErrorClass,
    pub raw_stdout: String,
    pub raw_stderr: String,
    pub exit_code: Option<i32>,
}

impl RenderFailure {
    pub fn new(error_class: ErrorClass, raw_stderr: impl Into<String>) -> Self {
        Self {
            error_class,
            raw_stdout: String::new(),
            raw_stderr: raw_stderr.into(),
            exit_code: None,
        }
    }
}

/// Result of executing one candidate. Created fresh per attempt and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderOutcome {
    Success(RenderSuccess),
    Failure(RenderFailure),
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RenderOutcome::Success(_))
    }

    pub fn error_class(&self) -> Option<ErrorClass> {
        match self {
            RenderOutcome::Success(_) => None,
            RenderOutcome::Failure(f) => Some(f.error_class),
        }
    }
}

/// Diagnostic text fed into the next generation attempt, exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Attempt whose outcome this report describes.
    pub attempt: u32,
    /// `None` when the program rendered but the review rejected it.
    pub error_class: Option<ErrorClass>,
    pub hint: Option<String>,
    pub text: String,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_tool_not_found_is_fatal() {
        let all = [
            ErrorClass::SyntaxError,
            ErrorClass::ImportError,
            ErrorClass::AttributeError,
            ErrorClass::TypeError,
            ErrorClass::ValueError,
            ErrorClass::RuntimeError,
            ErrorClass::Timeout,
            ErrorClass::EntryPointNotFound,
            ErrorClass::Unknown,
        ];
        for class in all {
            assert!(class.is_retriable(), "{class} should be retriable");
        }
        assert!(!ErrorClass::ToolNotFound.is_retriable());
    }

    #[test]
    fn test_outcome_serde_tagged() {
        let outcome = RenderOutcome::Failure(RenderFailure::new(ErrorClass::TypeError, "boom"));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["type"], "failure");
        assert_eq!(json["error_class"], "TypeError");
        assert_eq!(outcome.error_class(), Some(ErrorClass::TypeError));
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_resolution_display() {
        let r = Resolution {
            width: 1920,
            height: 1080,
        };
        assert_eq!(r.to_string(), "1920x1080");
    }
}
