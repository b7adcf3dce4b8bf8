//! Policy model: versioned, prioritized rule sets

use crate::context::has_known_root;
use crate::ids::{PolicyId, Timestamp};
use crate::{ValidationCode, ValidationError};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Verdict a matching rule contributes
///
/// Variants are ordered by strength: `Deny` beats `RequireApproval`, which
/// beats `Allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEffect {
    /// Permit the action
    Allow,
    /// Permit only after a human approves
    RequireApproval,
    /// Forbid the action
    Deny,
}

impl PolicyEffect {
    /// Wire name of the effect
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyEffect::Allow => "allow",
            PolicyEffect::RequireApproval => "require_approval",
            PolicyEffect::Deny => "deny",
        }
    }

    /// Parse an effect from its wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "allow" => Some(PolicyEffect::Allow),
            "require_approval" => Some(PolicyEffect::RequireApproval),
            "deny" => Some(PolicyEffect::Deny),
            _ => None,
        }
    }
}

impl fmt::Display for PolicyEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyStatus {
    /// Being authored; never enforced, but can be simulated
    #[default]
    Draft,
    /// Enforced while inside its effective window
    Active,
    /// Retired
    Archived,
}

impl PolicyStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyStatus::Draft => "draft",
            PolicyStatus::Active => "active",
            PolicyStatus::Archived => "archived",
        }
    }

    /// Parse a status from its wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(PolicyStatus::Draft),
            "active" => Some(PolicyStatus::Active),
            "archived" => Some(PolicyStatus::Archived),
            _ => None,
        }
    }

    /// Whether a policy may move from `self` to `next`
    pub fn can_become(&self, next: PolicyStatus) -> bool {
        matches!(
            (self, next),
            (PolicyStatus::Draft, PolicyStatus::Active)
                | (PolicyStatus::Draft, PolicyStatus::Archived)
                | (PolicyStatus::Active, PolicyStatus::Archived)
        )
    }
}

/// Comparison applied by a [`RuleCondition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Resolved value equals the condition value
    Equals,
    /// Resolved value differs from the condition value
    NotEquals,
    /// Resolved value is an element of the condition array
    In,
    /// Resolved value is not an element of the condition array
    NotIn,
    /// Numeric comparison
    GreaterThan,
    /// Numeric comparison
    LessThan,
    /// Substring or array membership
    Contains,
    /// Presence test
    Exists,
    /// Regular expression test
    Matches,
}

impl ConditionOperator {
    /// Wire name of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Equals => "equals",
            ConditionOperator::NotEquals => "not_equals",
            ConditionOperator::In => "in",
            ConditionOperator::NotIn => "not_in",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::Contains => "contains",
            ConditionOperator::Exists => "exists",
            ConditionOperator::Matches => "matches",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One test against a context field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Dotted path rooted at subject, action, resource or environment
    pub field: String,
    /// Comparison to apply
    pub operator: ConditionOperator,
    /// Operand; ignored by `exists` unless it is `false`
    #[serde(default)]
    pub value: Value,
}

impl RuleCondition {
    /// Create a condition
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// A conjunction of conditions with an effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Identifier, unique within the policy
    pub id: String,
    /// Display name
    pub name: String,
    /// Verdict when every condition holds
    pub effect: PolicyEffect,
    /// Conditions, all of which must hold
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    /// Higher priorities are tried first
    #[serde(default)]
    pub priority: i32,
}

impl PolicyRule {
    /// Create a rule without conditions
    pub fn new(id: impl Into<String>, name: impl Into<String>, effect: PolicyEffect) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            effect,
            conditions: Vec::new(),
            priority: 0,
        }
    }

    /// Append a condition
    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Set the rule priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// A versioned, prioritized rule set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Stable identifier shared across versions
    pub id: PolicyId,
    /// Display name
    pub name: String,
    /// Optional longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Semantic version
    pub version: Version,
    /// Rules in authoring order
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    /// Higher priorities are folded first
    #[serde(default)]
    pub priority: u32,
    /// Optional domain the policy governs (e.g. "payments")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Optional legal jurisdiction (e.g. "EU")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    /// Lifecycle status
    #[serde(default)]
    pub status: PolicyStatus,
    /// Inclusive start of the enforcement window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_from: Option<Timestamp>,
    /// Exclusive end of the enforcement window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_to: Option<Timestamp>,
}

impl Policy {
    /// Create a draft policy at version 1.0.0 with priority 0
    pub fn new(id: impl Into<PolicyId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: Version::new(1, 0, 0),
            rules: Vec::new(),
            priority: 0,
            scope: None,
            jurisdiction: None,
            status: PolicyStatus::Draft,
            effective_from: None,
            effective_to: None,
        }
    }

    /// Append a rule
    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set the policy priority
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: PolicyStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the version
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Whether the policy is enforced at `now`: active and inside its window
    pub fn is_effective_at(&self, now: Timestamp) -> bool {
        self.status == PolicyStatus::Active
            && self.effective_from.map_or(true, |from| from <= now)
            && self.effective_to.map_or(true, |to| now < to)
    }

    /// Rules ordered by descending priority; ties keep authoring order
    pub fn rules_by_priority(&self) -> Vec<&PolicyRule> {
        let mut rules: Vec<&PolicyRule> = self.rules.iter().collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        rules
    }

    /// Look up a rule by id
    pub fn rule(&self, id: &str) -> Option<&PolicyRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Check structural invariants
    ///
    /// Pattern syntax for `matches` is checked by the evaluator crate, which
    /// owns the regex engine.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::required("id"));
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::required("name"));
        }
        if let (Some(from), Some(to)) = (self.effective_from, self.effective_to) {
            if from >= to {
                return Err(ValidationError::new(
                    "effectiveTo",
                    ValidationCode::OutOfRange,
                    "Effective window is empty",
                    format!("> {}", from),
                    to.to_string(),
                ));
            }
        }

        let mut seen = HashSet::new();
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.id.trim().is_empty() {
                return Err(ValidationError::required(format!("rules[{}].id", index)));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(ValidationError::duplicate("rules.id", rule.id.clone()));
            }
            for (ci, condition) in rule.conditions.iter().enumerate() {
                let path = format!("rules[{}].conditions[{}]", index, ci);
                validate_condition(&path, condition)?;
            }
        }
        Ok(())
    }
}

fn validate_condition(path: &str, condition: &RuleCondition) -> Result<(), ValidationError> {
    if !has_known_root(&condition.field) {
        return Err(ValidationError::invalid_value(
            format!("{}.field", path),
            "path rooted at subject|action|resource|environment",
            condition.field.clone(),
        ));
    }
    let value_path = format!("{}.value", path);
    match condition.operator {
        ConditionOperator::In | ConditionOperator::NotIn if !condition.value.is_array() => {
            Err(ValidationError::invalid_value(value_path, "array", describe(&condition.value)))
        }
        ConditionOperator::GreaterThan | ConditionOperator::LessThan
            if !condition.value.is_number() =>
        {
            Err(ValidationError::invalid_value(value_path, "number", describe(&condition.value)))
        }
        ConditionOperator::Matches if !condition.value.is_string() => {
            Err(ValidationError::invalid_value(value_path, "pattern string", describe(&condition.value)))
        }
        _ => Ok(()),
    }
}

/// Short JSON type name used in error detail
pub fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}
