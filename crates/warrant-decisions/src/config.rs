//! Configuration for auto-approval advice
//!
//! Decides how much same-type history a decision needs before it may skip
//! human review.

use serde::{Deserialize, Serialize};
use warrant_domain::DecisionOutcome;

/// Thresholds for [`DecisionRepository::can_auto_approve`](crate::DecisionRepository::can_auto_approve)
///
/// # Examples
///
/// ```
/// use warrant_decisions::AutoApprovalConfig;
///
/// // Default configuration (balanced)
/// let config = AutoApprovalConfig::default();
/// assert_eq!(config.min_precedents, 3);
///
/// // More history required
/// let config = AutoApprovalConfig::conservative();
/// assert_eq!(config.min_precedents, 5);
///
/// // Less history required, partial outcomes count
/// let config = AutoApprovalConfig::permissive();
/// assert_eq!(config.min_precedents, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoApprovalConfig {
    /// Completed same-type decisions needed before advising auto-approval
    /// Default: 3
    pub min_precedents: usize,

    /// How many of the newest completed same-type decisions are considered
    /// Default: 50
    pub precedent_window: usize,

    /// Outcomes that count as a favorable precedent
    /// Default: success only
    pub favorable_outcomes: Vec<DecisionOutcome>,
}

impl Default for AutoApprovalConfig {
    fn default() -> Self {
        Self {
            min_precedents: 3,
            precedent_window: 50,
            favorable_outcomes: vec![DecisionOutcome::Success],
        }
    }
}

impl AutoApprovalConfig {
    /// Demand a longer clean history
    ///
    /// - Min precedents: 5
    /// - Window: 20 (a recent failure stays visible)
    pub fn conservative() -> Self {
        Self {
            min_precedents: 5,
            precedent_window: 20,
            favorable_outcomes: vec![DecisionOutcome::Success],
        }
    }

    /// Accept a single clean precedent
    ///
    /// - Min precedents: 1
    /// - Window: 100
    /// - Partial outcomes count as favorable
    pub fn permissive() -> Self {
        Self {
            min_precedents: 1,
            precedent_window: 100,
            favorable_outcomes: vec![DecisionOutcome::Success, DecisionOutcome::Partial],
        }
    }

    /// Reject thresholds that would make advice meaningless
    pub fn validate(&self) -> Result<(), String> {
        if self.min_precedents == 0 {
            return Err("min_precedents must be at least 1".to_string());
        }
        if self.precedent_window < self.min_precedents {
            return Err(format!(
                "precedent_window ({}) must be >= min_precedents ({})",
                self.precedent_window, self.min_precedents
            ));
        }
        if self.favorable_outcomes.contains(&DecisionOutcome::Failure) {
            return Err("favorable_outcomes must not include failure".to_string());
        }
        if self.favorable_outcomes.is_empty() {
            return Err("favorable_outcomes must not be empty".to_string());
        }
        Ok(())
    }

    /// Parse from TOML; missing keys take their defaults
    pub fn from_toml(s: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(s).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }

    /// Whether `outcome` counts as favorable
    pub fn is_favorable(&self, outcome: DecisionOutcome) -> bool {
        self.favorable_outcomes.contains(&outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AutoApprovalConfig::default();
        assert_eq!(config.min_precedents, 3);
        assert_eq!(config.precedent_window, 50);
        assert_eq!(config.favorable_outcomes, vec![DecisionOutcome::Success]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(AutoApprovalConfig::conservative().validate().is_ok());
        assert!(AutoApprovalConfig::permissive().validate().is_ok());
        assert!(
            AutoApprovalConfig::conservative().min_precedents
                > AutoApprovalConfig::default().min_precedents
        );
        assert!(AutoApprovalConfig::permissive().is_favorable(DecisionOutcome::Partial));
        assert!(!AutoApprovalConfig::default().is_favorable(DecisionOutcome::Partial));
    }

    #[test]
    fn test_zero_precedents_rejected() {
        let config = AutoApprovalConfig {
            min_precedents: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_smaller_than_minimum_rejected() {
        let config = AutoApprovalConfig {
            min_precedents: 10,
            precedent_window: 5,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("precedent_window"));
    }

    #[test]
    fn test_failure_is_never_favorable() {
        let config = AutoApprovalConfig {
            favorable_outcomes: vec![DecisionOutcome::Failure],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_and_round_trip() {
        let config = AutoApprovalConfig::from_toml("min_precedents = 2").unwrap();
        assert_eq!(config.min_precedents, 2);
        assert_eq!(config.precedent_window, 50);

        let text = AutoApprovalConfig::permissive().to_toml().unwrap();
        assert!(text.contains("favorable_outcomes"));
        assert_eq!(
            AutoApprovalConfig::from_toml(&text).unwrap(),
            AutoApprovalConfig::permissive()
        );
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(AutoApprovalConfig::from_toml("min_precedents = 0").is_err());
        assert!(AutoApprovalConfig::from_toml("min_precedents = \"many\"").is_err());
    }
}
