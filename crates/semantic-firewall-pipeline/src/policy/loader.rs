//! Policy document loading
//!
//! Policies are an ordered rule table:
//!
//! ```yaml
//! rules:
//!   - name: pii_threshold
//!     condition: "pii_score > 0.8"
//!     action: block
//!     reason: High PII score detected
//! default_action: allow
//! ```
//!
//! The raw document text is kept alongside the parsed rules; the external
//! evaluator hashes and uploads it verbatim.

use semantic_firewall_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single policy rule; first match wins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    pub condition: String,
    /// `allow` or `block`
    pub action: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Parsed policy document plus its raw text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    #[serde(default = "default_action")]
    pub default_action: String,
    /// Verbatim document text, used for hash-gated uploads
    #[serde(skip)]
    pub raw: String,
}

fn default_action() -> String {
    "allow".to_string()
}

impl PolicyDocument {
    /// The built-in baseline rule table
    pub fn baseline() -> Self {
        let rules = vec![
            PolicyRule {
                name: "heuristic_block".to_string(),
                condition: "heuristic_blocked == true".to_string(),
                action: "block".to_string(),
                reason: Some("Heuristic detection blocked".to_string()),
            },
            PolicyRule {
                name: "pii_threshold".to_string(),
                condition: "pii_score > 0.8".to_string(),
                action: "block".to_string(),
                reason: Some("High PII score detected".to_string()),
            },
            PolicyRule {
                name: "toxicity_threshold".to_string(),
                condition: "toxicity_score > 0.7".to_string(),
                action: "block".to_string(),
                reason: Some("High toxicity score detected".to_string()),
            },
            PolicyRule {
                name: "prompt_injection_threshold".to_string(),
                condition: "prompt_injection_score > 0.8".to_string(),
                action: "block".to_string(),
                reason: Some("High prompt injection score detected".to_string()),
            },
            PolicyRule {
                name: "max_length".to_string(),
                condition: "features.length > 4000".to_string(),
                action: "block".to_string(),
                reason: Some("Prompt too long (size limit)".to_string()),
            },
        ];

        let mut document = Self {
            rules,
            default_action: default_action(),
            raw: String::new(),
        };
        document.raw = serde_yaml::to_string(&document).unwrap_or_default();
        document
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut document: PolicyDocument = serde_yaml::from_str(raw)
            .map_err(|e| Error::policy(format!("Failed to parse policy document: {}", e)))?;
        document.raw = raw.to_string();
        Ok(document)
    }
}

/// Loader port
pub trait PolicyLoader: Send + Sync {
    fn load(&self) -> Result<PolicyDocument>;
}

/// Loads the rule table from a YAML file, falling back to the baseline
/// table when no file is configured or the file is missing
pub struct YamlPolicyLoader {
    path: Option<PathBuf>,
}

impl YamlPolicyLoader {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// A loader that always serves the baseline table
    pub fn baseline() -> Self {
        Self { path: None }
    }
}

impl PolicyLoader for YamlPolicyLoader {
    fn load(&self) -> Result<PolicyDocument> {
        let Some(path) = &self.path else {
            return Ok(PolicyDocument::baseline());
        };

        match std::fs::read_to_string(path) {
            Ok(raw) => PolicyDocument::parse(&raw),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Policy file unavailable, using baseline rules"
                );
                Ok(PolicyDocument::baseline())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_baseline_has_expected_rules() {
        let document = PolicyDocument::baseline();
        let names: Vec<&str> = document.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "heuristic_block",
                "pii_threshold",
                "toxicity_threshold",
                "prompt_injection_threshold",
                "max_length"
            ]
        );
        assert_eq!(document.default_action, "allow");
        assert!(!document.raw.is_empty());
    }

    #[test]
    fn test_parse_document() {
        let raw = r#"
rules:
  - name: short_only
    condition: "features.length > 100"
    action: block
    reason: Too long for this tenant
default_action: allow
"#;
        let document = PolicyDocument::parse(raw).unwrap();
        assert_eq!(document.rules.len(), 1);
        assert_eq!(document.rules[0].name, "short_only");
        assert_eq!(document.raw, raw);
    }

    #[test]
    fn test_parse_error_is_loud() {
        assert!(PolicyDocument::parse("rules: {not a list}").is_err());
    }

    #[test]
    fn test_loader_missing_file_falls_back() {
        let loader = YamlPolicyLoader::new(PathBuf::from("/nonexistent/policies.yaml"));
        let document = loader.load().unwrap();
        assert_eq!(document.rules.len(), 5);
    }

    #[test]
    fn test_loader_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "rules:\n  - name: r1\n    condition: \"pii_score > 0.5\"\n    action: block\n    reason: test"
        )
        .unwrap();

        let loader = YamlPolicyLoader::new(file.path().to_path_buf());
        let document = loader.load().unwrap();
        assert_eq!(document.rules.len(), 1);
        assert_eq!(document.default_action, "allow");
    }
}
