//! Scenario generation by back-solving rule conditions

use crate::types::Scenario;
use serde_json::{json, Value};
use warrant_domain::{ConditionOperator, EvaluationContext, PolicyEffect, PolicyRule, RuleCondition};

/// Action used by the default-deny scenario; no sane policy names it
pub const UNMATCHED_ACTION: &str = "__warrant_unmatched__";

/// Value used where a condition asks for anything outside a set
const SENTINEL: &str = "__warrant_other__";

/// Build a context intended to satisfy every condition of `rule`
///
/// Best effort: conditions that contradict each other on the same field, or
/// patterns that are not plain literals, may still yield a context the rule
/// does not match. Simulating the generated scenarios reveals those.
pub fn scenario_for_rule(rule: &PolicyRule) -> Scenario {
    let mut context = EvaluationContext::new(UNMATCHED_ACTION);
    for condition in &rule.conditions {
        if let Some(value) = solve(condition) {
            context.set_field(&condition.field, value);
        }
    }
    Scenario::new(format!("rule {} ({})", rule.id, rule.effect), context).expecting(rule.effect)
}

/// The fail-closed scenario: empty facts under an action no policy names
///
/// Best effort: rules that hold on empty facts, such as `action not_equals X`
/// or `exists: false`, still match this context. A policy with such a rule
/// fails this scenario, which then flags a rule that applies to everything.
pub fn default_deny_scenario() -> Scenario {
    Scenario::new("default deny", EvaluationContext::new(UNMATCHED_ACTION)).expecting(PolicyEffect::Deny)
}

/// A value that satisfies `condition`, or `None` when leaving the field
/// absent is what satisfies it
fn solve(condition: &RuleCondition) -> Option<Value> {
    let value = &condition.value;
    match condition.operator {
        ConditionOperator::Equals => Some(value.clone()),
        ConditionOperator::NotEquals => Some(different_from(value)),
        ConditionOperator::In => value.as_array().and_then(|items| items.first().cloned()),
        ConditionOperator::NotIn => Some(json!(SENTINEL)),
        ConditionOperator::GreaterThan => offset(value, 1),
        ConditionOperator::LessThan => offset(value, -1),
        ConditionOperator::Exists => match value.as_bool() {
            Some(false) => None,
            _ => Some(json!(true)),
        },
        ConditionOperator::Contains => match value {
            Value::String(needle) => Some(json!(needle)),
            other => Some(json!([other])),
        },
        ConditionOperator::Matches => value.as_str().map(|pattern| {
            let literal = pattern.strip_prefix('^').unwrap_or(pattern);
            let literal = literal.strip_suffix('$').unwrap_or(literal);
            json!(literal)
        }),
    }
}

fn offset(value: &Value, delta: i64) -> Option<Value> {
    if let Some(n) = value.as_i64() {
        return Some(json!(n.saturating_add(delta)));
    }
    value.as_f64().map(|n| json!(n + delta as f64))
}

fn different_from(value: &Value) -> Value {
    match value {
        Value::Bool(b) => json!(!b),
        Value::Number(_) => offset(value, 1).unwrap_or_else(|| json!(SENTINEL)),
        Value::String(s) if s == SENTINEL => json!(format!("{}-alt", SENTINEL)),
        _ => json!(SENTINEL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warrant_policy::PolicyEvaluator;

    fn rule_with(condition: RuleCondition) -> PolicyRule {
        PolicyRule::new("r", "R", PolicyEffect::Allow).with_condition(condition)
    }

    fn solves(condition: RuleCondition) -> bool {
        let rule = rule_with(condition);
        let scenario = scenario_for_rule(&rule);
        PolicyEvaluator::default_config()
            .evaluate_rule(&rule, &scenario.context)
            .matched
    }

    #[test]
    fn test_each_operator_is_solved() {
        assert!(solves(RuleCondition::new("subject.role", ConditionOperator::Equals, "admin")));
        assert!(solves(RuleCondition::new("subject.role", ConditionOperator::NotEquals, "admin")));
        assert!(solves(RuleCondition::new("subject.level", ConditionOperator::NotEquals, 3)));
        assert!(solves(RuleCondition::new("resource.env", ConditionOperator::In, json!(["prod", "stage"]))));
        assert!(solves(RuleCondition::new("resource.env", ConditionOperator::NotIn, json!(["dev"]))));
        assert!(solves(RuleCondition::new("resource.amount", ConditionOperator::GreaterThan, 100)));
        assert!(solves(RuleCondition::new("resource.amount", ConditionOperator::LessThan, 0.5)));
        assert!(solves(RuleCondition::new("environment.flag", ConditionOperator::Exists, true)));
        assert!(solves(RuleCondition::new("environment.flag", ConditionOperator::Exists, false)));
        assert!(solves(RuleCondition::new("resource.tags", ConditionOperator::Contains, "pii")));
        assert!(solves(RuleCondition::new("resource.ids", ConditionOperator::Contains, 7)));
        assert!(solves(RuleCondition::new("subject.email", ConditionOperator::Matches, "^ops@corp$")));
        assert!(solves(RuleCondition::new("action", ConditionOperator::Equals, "deploy")));
    }

    #[test]
    fn test_greater_than_is_literal_plus_one() {
        let scenario = scenario_for_rule(&rule_with(RuleCondition::new(
            "resource.amount",
            ConditionOperator::GreaterThan,
            100,
        )));
        assert_eq!(scenario.context.resolve("resource.amount").as_deref(), Some(&json!(101)));
    }

    #[test]
    fn test_in_uses_first_element() {
        let scenario = scenario_for_rule(&rule_with(RuleCondition::new(
            "resource.env",
            ConditionOperator::In,
            json!(["prod", "stage"]),
        )));
        assert_eq!(scenario.context.resolve("resource.env").as_deref(), Some(&json!("prod")));
    }

    #[test]
    fn test_nested_fields_are_created() {
        let scenario = scenario_for_rule(&rule_with(RuleCondition::new(
            "resource.owner.team",
            ConditionOperator::Equals,
            "payments",
        )));
        assert_eq!(
            scenario.context.resolve("resource.owner.team").as_deref(),
            Some(&json!("payments"))
        );
    }

    #[test]
    fn test_expectation_is_rule_effect() {
        let rule = PolicyRule::new("d", "D", PolicyEffect::Deny);
        assert_eq!(scenario_for_rule(&rule).expected_decision, Some(PolicyEffect::Deny));
        assert_eq!(scenario_for_rule(&rule).name, "rule d (deny)");
    }

    #[test]
    fn test_default_deny_scenario_matches_rules_that_hold_on_empty_facts() {
        let evaluator = PolicyEvaluator::default_config();
        let scenario = default_deny_scenario();

        let absent = rule_with(RuleCondition::new("subject.token", ConditionOperator::Exists, false));
        assert!(evaluator.evaluate_rule(&absent, &scenario.context).matched);

        let other_action = rule_with(RuleCondition::new("action", ConditionOperator::NotEquals, "deploy"));
        assert!(evaluator.evaluate_rule(&other_action, &scenario.context).matched);

        let present = rule_with(RuleCondition::new("subject.role", ConditionOperator::Exists, true));
        assert!(!evaluator.evaluate_rule(&present, &scenario.context).matched);
    }

    #[test]
    fn test_default_deny_scenario_is_empty() {
        let scenario = default_deny_scenario();
        assert!(scenario.context.subject.is_empty());
        assert!(scenario.context.resource.is_empty());
        assert!(scenario.context.environment.is_empty());
        assert_eq!(scenario.expected_decision, Some(PolicyEffect::Deny));
    }
}
