//! Configuration for the Simulator

use serde::{Deserialize, Serialize};

/// Bounds on the work one simulation call may do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Maximum scenarios per simulation or comparison
    pub max_scenarios: usize,

    /// Maximum rules in any policy handed to the simulator
    pub max_rules_per_policy: usize,

    /// Maximum policies in one dry run
    pub max_policies: usize,

    /// Maximum scenarios produced by scenario generation
    pub max_generated_scenarios: usize,
}

impl Default for SimulatorConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            max_scenarios: 1_000,
            max_rules_per_policy: 200,
            max_policies: 100,
            max_generated_scenarios: 201,
        }
    }
}

impl SimulatorConfig {
    /// Strict preset: small bounds for interactive or shared use
    pub fn strict() -> Self {
        Self {
            max_scenarios: 100,
            max_rules_per_policy: 50,
            max_policies: 20,
            max_generated_scenarios: 51,
        }
    }

    /// Lenient preset: large bounds for offline policy review
    pub fn lenient() -> Self {
        Self {
            max_scenarios: 20_000,
            max_rules_per_policy: 2_000,
            max_policies: 1_000,
            max_generated_scenarios: 2_001,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_scenarios == 0 {
            return Err("max_scenarios must be greater than 0".to_string());
        }
        if self.max_rules_per_policy == 0 {
            return Err("max_rules_per_policy must be greater than 0".to_string());
        }
        if self.max_policies == 0 {
            return Err("max_policies must be greater than 0".to_string());
        }
        // One scenario per rule plus the default-deny scenario
        if self.max_generated_scenarios < 2 {
            return Err("max_generated_scenarios must be at least 2".to_string());
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(SimulatorConfig::default().validate().is_ok());
        assert!(SimulatorConfig::strict().validate().is_ok());
        assert!(SimulatorConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_invalid_max_scenarios() {
        let config = SimulatorConfig {
            max_scenarios: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generated_bound_needs_room_for_default_deny() {
        let config = SimulatorConfig {
            max_generated_scenarios: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SimulatorConfig::strict();
        let text = config.to_toml().unwrap();
        assert_eq!(SimulatorConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_partial_toml() {
        let config = SimulatorConfig::from_toml("max_scenarios = 5").unwrap();
        assert_eq!(config.max_scenarios, 5);
        assert_eq!(config.max_policies, SimulatorConfig::default().max_policies);
    }
}
