//! Evaluation results

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warrant_domain::{ConditionOperator, PolicyEffect, PolicyId, Timestamp};

/// A condition that did not hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedCondition {
    /// Dotted field path
    pub field: String,
    /// Operator applied
    pub operator: ConditionOperator,
    /// Value from the rule
    pub expected: Value,
    /// Value resolved from the context, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    /// Why the condition failed
    pub reason: String,
}

/// Outcome of one rule against one context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEvaluationResult {
    /// Rule id
    pub rule_id: String,
    /// Rule name
    pub rule_name: String,
    /// Effect the rule carries
    pub effect: PolicyEffect,
    /// True iff every condition held
    pub matched: bool,
    /// Conditions that did not hold
    #[serde(default)]
    pub failed_conditions: Vec<FailedCondition>,
}

/// Outcome of one policy against one context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluationResult {
    /// Policy id
    pub policy_id: PolicyId,
    /// Policy version
    pub policy_version: Version,
    /// Policy-level priority
    pub policy_priority: u32,
    /// Effect of the applied rule; `None` when no rule matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<PolicyEffect>,
    /// Highest-priority matching rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_rule: Option<String>,
    /// Every rule, highest priority first
    pub rule_results: Vec<RuleEvaluationResult>,
}

impl PolicyEvaluationResult {
    /// Rules that matched, highest priority first
    pub fn matched_rules(&self) -> impl Iterator<Item = &RuleEvaluationResult> {
        self.rule_results.iter().filter(|r| r.matched)
    }

    /// Whether the policy contributes a verdict
    pub fn contributes(&self) -> bool {
        self.decision.is_some()
    }
}

/// Combined outcome of many policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateEvaluationResult {
    /// Final effect after precedence folding
    pub final_decision: PolicyEffect,
    /// Policy whose verdict stood; `None` for the default deny
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deciding_policy: Option<PolicyId>,
    /// Rule of the deciding policy that matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deciding_rule: Option<String>,
    /// Policies evaluated, in evaluation order
    pub policy_results: Vec<PolicyEvaluationResult>,
    /// When the evaluation ran
    pub evaluated_at: Timestamp,
}

impl AggregateEvaluationResult {
    /// Whether the action may proceed without further review
    pub fn is_allowed(&self) -> bool {
        self.final_decision == PolicyEffect::Allow
    }

    /// Whether the result is the fail-closed fallback
    pub fn is_default_deny(&self) -> bool {
        self.final_decision == PolicyEffect::Deny && self.deciding_policy.is_none()
    }
}

/// Knobs for [`PolicyEvaluator::evaluate_policies`](crate::PolicyEvaluator::evaluate_policies)
#[derive(Debug, Clone, Default)]
pub struct EvaluationOptions {
    /// Evaluate every given policy regardless of status and window
    pub bypass_effective_filter: bool,

    /// Instant used for the effectiveness filter and the result stamp
    pub now: Option<Timestamp>,
}

impl EvaluationOptions {
    /// Options that evaluate drafts and expired policies too
    pub fn bypassed() -> Self {
        Self {
            bypass_effective_filter: true,
            now: None,
        }
    }

    /// Pin the evaluation instant
    pub fn at(mut self, now: Timestamp) -> Self {
        self.now = Some(now);
        self
    }
}
