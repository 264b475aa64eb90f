//! Content validation for staged files
//!
//! A [`ContentValidator`] inspects one file and reports [`Issue`]s. The staging
//! ground aggregates the issues of every staged file into a [`ValidationResult`]
//! which gates commits: errors always block, warnings block unless the caller
//! explicitly allows them, info never blocks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Issue severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(label)
    }
}

/// One finding about one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    pub path: String,
}

impl Issue {
    pub fn new(severity: Severity, path: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            path: path.to_string(),
        }
    }

    pub fn error(path: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, path, message)
    }

    pub fn warning(path: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, path, message)
    }

    pub fn info(path: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, path, message)
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.path, self.message)
    }
}

/// Content format inferred from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    Json,
    Bpmn,
    Dmn,
    Xml,
    Fsh,
    Yaml,
    Other,
}

impl FormatHint {
    pub fn from_path(path: &str) -> Self {
        let extension = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "json" => FormatHint::Json,
            "bpmn" => FormatHint::Bpmn,
            "dmn" => FormatHint::Dmn,
            "xml" => FormatHint::Xml,
            "fsh" => FormatHint::Fsh,
            "yaml" | "yml" => FormatHint::Yaml,
            _ => FormatHint::Other,
        }
    }

    /// Formats that must be valid UTF-8 text
    pub fn is_text(&self) -> bool {
        !matches!(self, FormatHint::Other)
    }

    fn is_xml_family(&self) -> bool {
        matches!(self, FormatHint::Bpmn | FormatHint::Dmn | FormatHint::Xml)
    }
}

/// Format-specific checks over one file
pub trait ContentValidator: Send + Sync {
    fn validate(&self, path: &str, content: &[u8], hint: FormatHint) -> Vec<Issue>;
}

/// Structural checks that need no schema
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicContentValidator;

const FSH_DECLARATIONS: [&str; 6] = [
    "Profile:",
    "Instance:",
    "ValueSet:",
    "CodeSystem:",
    "Extension:",
    "Logical:",
];

impl ContentValidator for BasicContentValidator {
    fn validate(&self, path: &str, content: &[u8], hint: FormatHint) -> Vec<Issue> {
        if content.iter().all(u8::is_ascii_whitespace) {
            return vec![Issue::warning(path, "file is empty")];
        }

        let text = match std::str::from_utf8(content) {
            Ok(text) => text,
            Err(e) if hint.is_text() => {
                return vec![Issue::error(path, format!("content is not valid UTF-8: {}", e))]
            }
            Err(_) => return Vec::new(),
        };

        let mut issues = Vec::new();
        match hint {
            FormatHint::Json => {
                if let Err(e) = serde_json::from_str::<serde_json::Value>(text) {
                    issues.push(Issue::error(path, format!("invalid JSON: {}", e)));
                }
            }
            hint if hint.is_xml_family() => {
                let body = text.trim_start_matches('\u{feff}').trim_start();
                if !body.starts_with('<') {
                    issues.push(Issue::error(path, "content is not XML"));
                } else if matches!(hint, FormatHint::Bpmn | FormatHint::Dmn)
                    && !body.contains("definitions")
                {
                    issues.push(Issue::warning(path, "no <definitions> root element found"));
                }
            }
            FormatHint::Fsh => {
                let declares_entity = text.lines().any(|line| {
                    let line = line.trim_start();
                    FSH_DECLARATIONS.iter().any(|keyword| line.starts_with(keyword))
                });
                if !declares_entity {
                    issues.push(Issue::warning(path, "no FSH entity declaration found"));
                }
            }
            _ => {}
        }
        issues
    }
}

/// Aggregated issues over a whole staging session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    /// Every error and warning, errors first
    pub blocking_issues: Vec<Issue>,
    /// Every issue, including info
    pub issues: Vec<Issue>,
}

impl ValidationResult {
    pub fn from_issues(mut issues: Vec<Issue>) -> Self {
        issues.sort_by(|a, b| a.severity.cmp(&b.severity).then_with(|| a.path.cmp(&b.path)));
        let count = |severity| issues.iter().filter(|i| i.severity == severity).count();
        let (error_count, warning_count, info_count) = (
            count(Severity::Error),
            count(Severity::Warning),
            count(Severity::Info),
        );
        let blocking_issues = issues
            .iter()
            .filter(|i| i.severity != Severity::Info)
            .cloned()
            .collect();
        Self {
            error_count,
            warning_count,
            info_count,
            blocking_issues,
            issues,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn is_clean(&self) -> bool {
        self.blocking_issues.is_empty()
    }

    /// Whether a commit must be refused
    pub fn blocks_commit(&self, allow_with_warnings: bool) -> bool {
        self.has_errors() || (self.warning_count > 0 && !allow_with_warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(path: &str, content: &str) -> Vec<Issue> {
        BasicContentValidator.validate(path, content.as_bytes(), FormatHint::from_path(path))
    }

    #[test]
    fn test_format_hint_from_extension() {
        assert_eq!(FormatHint::from_path("input/q/questionnaire.json"), FormatHint::Json);
        assert_eq!(FormatHint::from_path("input/business-processes/a.BPMN"), FormatHint::Bpmn);
        assert_eq!(FormatHint::from_path("input/decisions/d.dmn"), FormatHint::Dmn);
        assert_eq!(FormatHint::from_path("sushi-config.yml"), FormatHint::Yaml);
        assert_eq!(FormatHint::from_path("README"), FormatHint::Other);
    }

    #[test]
    fn test_json_must_parse() {
        assert!(check("q.json", r#"{"resourceType":"Questionnaire"}"#).is_empty());
        let issues = check("q.json", "{\"resourceType\":");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_xml_family_checks() {
        assert!(check("p.bpmn", "<?xml version=\"1.0\"?><bpmn:definitions/>").is_empty());
        assert_eq!(check("p.bpmn", "not xml")[0].severity, Severity::Error);
        assert_eq!(check("d.dmn", "<dmn/>")[0].severity, Severity::Warning);
        assert!(check("plain.xml", "<root/>").is_empty());
    }

    #[test]
    fn test_fsh_requires_entity() {
        assert!(check("a.fsh", "Profile: ImmunizationEvent\nParent: Immunization\n").is_empty());
        assert_eq!(check("a.fsh", "// only a comment\n")[0].severity, Severity::Warning);
    }

    #[test]
    fn test_empty_and_binary_content() {
        assert_eq!(check("q.json", "  \n")[0].severity, Severity::Warning);
        let binary = BasicContentValidator.validate("a.fsh", &[0xff, 0xfe, 0x00], FormatHint::Fsh);
        assert_eq!(binary[0].severity, Severity::Error);
        assert!(BasicContentValidator
            .validate("logo.png", &[0x89, 0x50, 0xff], FormatHint::Other)
            .is_empty());
    }

    #[test]
    fn test_result_aggregation_and_gate() {
        let result = ValidationResult::from_issues(vec![
            Issue::info("a.json", "no changes"),
            Issue::warning("b.fsh", "no entity"),
        ]);
        assert_eq!((result.error_count, result.warning_count, result.info_count), (0, 1, 1));
        assert_eq!(result.blocking_issues.len(), 1);
        assert!(result.blocks_commit(false));
        assert!(!result.blocks_commit(true));

        let with_error = ValidationResult::from_issues(vec![
            Issue::warning("b.fsh", "no entity"),
            Issue::error("c.json", "invalid JSON"),
        ]);
        assert_eq!(with_error.blocking_issues[0].severity, Severity::Error);
        assert!(with_error.blocks_commit(true));

        assert!(!ValidationResult::default().blocks_commit(false));
    }
}
