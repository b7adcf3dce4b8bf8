//! Evaluator configuration

use serde::{Deserialize, Serialize};

/// Limits applied while evaluating `matches` conditions
///
/// Patterns come from policy authors, so their size is bounded to keep
/// evaluation cheap for every caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Longest accepted pattern, in bytes
    pub max_pattern_length: usize,

    /// Compiled program size limit handed to the regex engine, in bytes
    pub regex_size_limit: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_pattern_length: 512,
            regex_size_limit: 1 << 20,
        }
    }
}

impl EvaluatorConfig {
    /// Tight limits for untrusted policy sources
    pub fn strict() -> Self {
        Self {
            max_pattern_length: 128,
            regex_size_limit: 64 * 1024,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_pattern_length == 0 {
            return Err("max_pattern_length must be > 0".to_string());
        }
        if self.regex_size_limit < 1024 {
            return Err("regex_size_limit must be at least 1024 bytes".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EvaluatorConfig::default().validate().is_ok());
        assert!(EvaluatorConfig::strict().validate().is_ok());
    }

    #[test]
    fn test_zero_pattern_length_rejected() {
        let config = EvaluatorConfig {
            max_pattern_length: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EvaluatorConfig = toml::from_str("max_pattern_length = 64").unwrap();
        assert_eq!(config.max_pattern_length, 64);
        assert_eq!(config.regex_size_limit, EvaluatorConfig::default().regex_size_limit);
    }
}
