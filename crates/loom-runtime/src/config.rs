//! Runtime configuration (`loom.toml`)
//!
//! ```toml
//! [grammar]
//! cache_capacity = 128
//! retain_probability = 0.5
//! use_worker = true
//!
//! [resolve]
//! parser_alias = "/parser"
//! support_alias = "/support"
//! grammar_suffix = ".grammar"
//! terms_pattern = '\.terms(\.js)?$'
//! source_suffixes = [".ts", ".js"]
//!
//! [build]
//! fast_prebuilt = true
//! ```
//!
//! Every field is optional.

use crate::error::ConfigError;
use loom_grammar::CacheConfig;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RuntimeConfig {
    /// Grammar compiler cache
    #[serde(default)]
    pub grammar: CacheConfig,

    /// Unit resolution policy
    #[serde(default)]
    pub resolve: ResolveConfig,

    #[serde(default)]
    pub build: BuildConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResolveConfig {
    /// Pseudo-path the index imports live parser exports from
    #[serde(default = "default_parser_alias")]
    pub parser_alias: String,

    /// Pseudo-path the index imports live support exports from
    #[serde(default = "default_support_alias")]
    pub support_alias: String,

    #[serde(default = "default_grammar_suffix")]
    pub grammar_suffix: String,

    /// Paths matching this load the generated terms module
    #[serde(default = "default_terms_pattern")]
    pub terms_pattern: String,

    /// Tried in order when an absolute path has no exact match
    #[serde(default = "default_source_suffixes")]
    pub source_suffixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildConfig {
    /// Run prebuilt snapshots as single scripts
    #[serde(default = "default_fast_prebuilt")]
    pub fast_prebuilt: bool,
}

fn default_parser_alias() -> String {
    "/parser".to_string()
}

fn default_support_alias() -> String {
    "/support".to_string()
}

fn default_grammar_suffix() -> String {
    ".grammar".to_string()
}

fn default_terms_pattern() -> String {
    r"\.terms(\.js)?$".to_string()
}

fn default_source_suffixes() -> Vec<String> {
    vec![".ts".to_string(), ".js".to_string()]
}

fn default_fast_prebuilt() -> bool {
    true
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            parser_alias: default_parser_alias(),
            support_alias: default_support_alias(),
            grammar_suffix: default_grammar_suffix(),
            terms_pattern: default_terms_pattern(),
            source_suffixes: default_source_suffixes(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            fast_prebuilt: default_fast_prebuilt(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = self.grammar.retain_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::Invalid(format!(
                "grammar.retain_probability must be between 0 and 1, got {}",
                p
            )));
        }
        if self.resolve.grammar_suffix.is_empty() {
            return Err(ConfigError::Invalid("resolve.grammar_suffix cannot be empty".to_string()));
        }
        for alias in [&self.resolve.parser_alias, &self.resolve.support_alias] {
            if !alias.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "Pseudo-path '{}' must be absolute",
                    alias
                )));
            }
        }
        self.resolve.terms_regex()?;
        Ok(())
    }
}

impl ResolveConfig {
    /// Compiled terms naming convention.
    pub fn terms_regex(&self) -> Result<Regex, ConfigError> {
        Regex::new(&self.terms_pattern)
            .map_err(|e| ConfigError::Invalid(format!("resolve.terms_pattern: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RuntimeConfig::from_str("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.resolve.parser_alias, "/parser");
        assert_eq!(config.resolve.source_suffixes, vec![".ts", ".js"]);
        assert!(config.build.fast_prebuilt);
        assert_eq!(config.grammar.cache_capacity, 128);
    }

    #[test]
    fn test_partial_sections() {
        let config = RuntimeConfig::from_str(
            r#"
            [grammar]
            seed = 7
            use_worker = false

            [resolve]
            source_suffixes = [".js"]
            "#,
        )
        .unwrap();
        assert_eq!(config.grammar.seed, Some(7));
        assert!(!config.grammar.use_worker);
        assert_eq!(config.grammar.retain_probability, 0.5);
        assert_eq!(config.resolve.source_suffixes, vec![".js"]);
        assert_eq!(config.resolve.grammar_suffix, ".grammar");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = RuntimeConfig::from_str("[grammar]\nretain_probability = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = RuntimeConfig::from_str("[resolve]\nterms_pattern = '('").unwrap_err();
        assert!(err.to_string().contains("terms_pattern"));

        let err = RuntimeConfig::from_str("[build\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_terms_regex() {
        let re = ResolveConfig::default().terms_regex().unwrap();
        assert!(re.is_match("/parser/syntax.grammar.terms"));
        assert!(re.is_match("/parser/syntax.grammar.terms.js"));
        assert!(!re.is_match("/parser/terms.ts"));
    }
}
