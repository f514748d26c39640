//! Configuration types for the rewrite engine.

use crate::event::DispatcherType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration for the rewrite engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Configuration version
    pub version: String,
    /// Global settings
    pub settings: Settings,
    /// Rewrite rules (evaluated in priority order)
    pub rules: Vec<RuleConfig>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: Settings::default(),
            rules: vec![],
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Context path applied to requests that do not carry one
    pub context_path: String,
    /// Enable the X-Rewrite-Rule debug header
    pub debug_headers: bool,
}

/// A rewrite rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Rule id (for logging/debugging)
    pub id: String,
    /// Optional description
    #[serde(default)]
    pub description: String,
    /// Whether the rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Priority (higher = evaluated first)
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Matching conditions, all of which must hold
    #[serde(rename = "match", default)]
    pub matcher: MatchConfig,
    /// Parameter configuration, keyed by placeholder name
    #[serde(rename = "where", default)]
    pub parameters: BTreeMap<String, ParameterConfig>,
    /// What to do when the rule matches
    #[serde(default)]
    pub perform: PerformConfig,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    50
}

/// Matching conditions for a rule.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MatchConfig {
    /// Path pattern with `{name}` placeholders, relative to the context path
    #[serde(default)]
    pub path: Option<String>,
    /// HTTP methods to match
    #[serde(default)]
    pub methods: Option<Vec<String>>,
    /// Header conditions
    #[serde(default)]
    pub headers: Option<Vec<HeaderMatch>>,
    /// Dispatcher type to match
    #[serde(default)]
    pub dispatch: Option<DispatcherType>,
}

/// Header condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderMatch {
    /// Header name pattern (case-insensitive)
    pub name: String,
    /// Header value pattern; any value when absent
    #[serde(default)]
    pub value: Option<String>,
}

/// Configuration of one placeholder.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParameterConfig {
    /// Regex the captured value must match
    #[serde(default)]
    pub matches: Option<String>,
    /// Converter name (integer, decimal, boolean)
    #[serde(default)]
    pub converter: Option<String>,
    /// Validator
    #[serde(default)]
    pub validator: Option<ValidatorConfig>,
    /// Transform names, applied in order (lowercase, uppercase, url_decode, url_encode)
    #[serde(default)]
    pub transforms: Vec<String>,
    /// Additional evaluation properties to bind the value to
    #[serde(default)]
    pub bind_to: Vec<String>,
}

/// Validator configuration: a built-in name or a regex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ValidatorConfig {
    /// Built-in validator (not_empty, integer)
    Named(String),
    /// Value must fully match the regex
    Regex { regex: String },
}

/// Operations performed by a matching rule.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PerformConfig {
    /// Response headers to add (values support `{name}` substitution)
    #[serde(default)]
    pub headers: Vec<HeaderValue>,
    /// Response status code
    #[serde(default)]
    pub status: Option<u16>,
    /// Forward to an internal resource
    #[serde(default)]
    pub forward: Option<String>,
    /// Include an internal resource
    #[serde(default)]
    pub include: Option<String>,
    /// Redirect the client
    #[serde(default)]
    pub redirect: Option<RedirectConfig>,
    /// Mark handled and continue with later rules
    #[serde(default)]
    pub proceed: bool,
    /// End the request
    #[serde(default)]
    pub abort: bool,
}

/// Header name-value pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderValue {
    /// Header name
    pub name: String,
    /// Header value (supports variable substitution)
    pub value: String,
}

/// Redirect configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectConfig {
    /// Target location (supports variable substitution)
    pub location: String,
    /// 301 instead of 302
    #[serde(default)]
    pub permanent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RewriteConfig::default();
        assert_eq!(config.version, "1");
        assert!(config.rules.is_empty());
        assert!(config.settings.context_path.is_empty());
        assert!(!config.settings.debug_headers);
    }

    #[test]
    fn test_config_parsing() {
        let yaml = r#"
version: "1"
settings:
  context_path: /shop
  debug_headers: true
rules:
  - id: "product"
    priority: 100
    match:
      path: "/product/{id}"
      methods: ["GET"]
      dispatch: request
    where:
      id:
        matches: "\\d+"
        converter: integer
        bind_to: [product_id]
    perform:
      forward: "/catalog?product={id}"
"#;
        let config: RewriteConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.settings.context_path, "/shop");
        assert_eq!(config.rules.len(), 1);

        let rule = &config.rules[0];
        assert_eq!(rule.id, "product");
        assert!(rule.enabled);
        assert_eq!(rule.priority, 100);
        assert_eq!(rule.matcher.dispatch, Some(DispatcherType::Request));
        assert_eq!(rule.parameters["id"].matches.as_deref(), Some("\\d+"));
        assert_eq!(rule.parameters["id"].bind_to, vec!["product_id"]);
        assert_eq!(rule.perform.forward.as_deref(), Some("/catalog?product={id}"));
    }

    #[test]
    fn test_rule_defaults() {
        let json = r#"{"rules": [{"id": "minimal"}]}"#;
        let config: RewriteConfig = serde_json::from_str(json).unwrap();

        let rule = &config.rules[0];
        assert!(rule.enabled);
        assert_eq!(rule.priority, 50);
        assert!(rule.matcher.path.is_none());
        assert!(rule.parameters.is_empty());
        assert!(!rule.perform.abort);
    }

    #[test]
    fn test_validator_forms() {
        let json = r#"{"a": {"validator": "not_empty"}, "b": {"validator": {"regex": "[a-z]+"}}}"#;
        let parameters: BTreeMap<String, ParameterConfig> = serde_json::from_str(json).unwrap();

        assert_eq!(
            parameters["a"].validator,
            Some(ValidatorConfig::Named("not_empty".to_string()))
        );
        assert_eq!(
            parameters["b"].validator,
            Some(ValidatorConfig::Regex {
                regex: "[a-z]+".to_string()
            })
        );
    }
}
