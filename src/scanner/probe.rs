//! Repository compatibility rule
//!
//! A repository holds DAK content when its marker manifest (by default the
//! SUSHI configuration) declares the base SMART guidelines package.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MARKER_PATH: &str = "sushi-config.yaml";
pub const DEFAULT_REQUIRED_IDENTIFIER: &str = "smart.who.int.base";

/// Marker file and the identifier it must declare
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityRule {
    pub marker_path: String,
    pub required_identifier: String,
}

impl Default for CompatibilityRule {
    fn default() -> Self {
        Self {
            marker_path: DEFAULT_MARKER_PATH.to_string(),
            required_identifier: DEFAULT_REQUIRED_IDENTIFIER.to_string(),
        }
    }
}

impl CompatibilityRule {
    pub fn new(marker_path: impl Into<String>, required_identifier: impl Into<String>) -> Self {
        Self {
            marker_path: marker_path.into(),
            required_identifier: required_identifier.into(),
        }
    }

    /// Whether the marker content declares the required identifier.
    ///
    /// Accepted forms: a dependency key (`smart.who.int.base: 0.1.0`), a quoted
    /// token, or a bare list item. Substrings of longer identifiers do not match.
    pub fn matches(&self, content: &[u8]) -> bool {
        let text = String::from_utf8_lossy(content);
        let id = self.required_identifier.as_str();
        if id.is_empty() {
            return false;
        }

        text.lines().any(|line| {
            let line = strip_comment(line).trim();
            let line = line.strip_prefix("- ").unwrap_or(line).trim_start();
            if let Some(rest) = line.strip_prefix(id) {
                if rest.is_empty() || rest.trim_start().starts_with(':') {
                    return true;
                }
            }
            contains_token(line, id)
        })
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(" #") {
        Some(index) => &line[..index],
        None if line.trim_start().starts_with('#') => "",
        None => line,
    }
}

/// `id` appears in `line` delimited by quotes
fn contains_token(line: &str, id: &str) -> bool {
    ['"', '\''].iter().any(|quote| {
        let quoted = format!("{}{}{}", quote, id, quote);
        line.contains(&quoted)
    })
}
