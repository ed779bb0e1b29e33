//! Ordered (pattern, class) rules mapping engine output to an [`ErrorClass`].

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::ErrorClass;

#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub pattern: Regex,
    pub class: ErrorClass,
}

/// First matching rule wins; nothing matching yields `Unknown`.
///
/// The last exception line of a traceback is tried before the whole text, so
/// a chained traceback is classified by the exception that was finally raised.
#[derive(Debug, Clone)]
pub struct ClassificationRules {
    rules: Vec<ClassificationRule>,
}

impl ClassificationRules {
    pub fn new<'a>(
        rules: impl IntoIterator<Item = (&'a str, ErrorClass)>,
    ) -> Result<Self, regex::Error> {
        let rules = rules
            .into_iter()
            .map(|(pattern, class)| {
                Ok(ClassificationRule {
                    pattern: Regex::new(pattern)?,
                    class,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    fn first_match(&self, text: &str) -> Option<ErrorClass> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(text))
            .map(|rule| rule.class)
    }

    fn match_text(&self, text: &str) -> Option<ErrorClass> {
        last_exception_line(text)
            .and_then(|line| self.first_match(line))
            .or_else(|| self.first_match(text))
    }

    /// Classify stderr first, then stdout.
    pub fn classify(&self, stderr: &str, stdout: &str) -> ErrorClass {
        self.match_text(stderr)
            .or_else(|| self.match_text(stdout))
            .unwrap_or(ErrorClass::Unknown)
    }
}

impl Default for ClassificationRules {
    fn default() -> Self {
        default_rules()
    }
}

fn exception_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:[A-Za-z_][\w.]*\.)?[A-Za-z_]\w*(?:Error|Exception)\b.*$")
            .expect("exception line pattern is valid")
    })
}

/// The final `SomeError: ...` line of a traceback, if any.
fn last_exception_line(text: &str) -> Option<&str> {
    exception_line_regex().find_iter(text).last().map(|m| m.as_str())
}

const DEFAULT_RULES: &[(&str, ErrorClass)] = &[
    (r"\b(SyntaxError|IndentationError|TabError)\b", ErrorClass::SyntaxError),
    (r"\b(ModuleNotFoundError|ImportError)\b", ErrorClass::ImportError),
    (r"\bAttributeError\b", ErrorClass::AttributeError),
    (r"\bTypeError\b", ErrorClass::TypeError),
    (r"\bValueError\b", ErrorClass::ValueError),
    (
        r"(?i)(no scenes? (inside|in) that module|is not in the script|scene .* not found)",
        ErrorClass::EntryPointNotFound,
    ),
    (
        r"\b(RuntimeError|NameError|IndexError|KeyError|ZeroDivisionError)\b|(?i)latex error",
        ErrorClass::RuntimeError,
    ),
];

/// Built-in rule set for Manim/Python tracebacks.
pub fn default_rules() -> ClassificationRules {
    let rules = DEFAULT_RULES
        .iter()
        .filter_map(|(pattern, class)| {
            Regex::new(pattern).ok().map(|pattern| ClassificationRule {
                pattern,
                class: *class,
            })
        })
        .collect();
    ClassificationRules { rules }
}

/// Classify with the default rules.
pub fn classify(stderr: &str, stdout: &str) -> ErrorClass {
    default_rules().classify(stderr, stdout)
}
