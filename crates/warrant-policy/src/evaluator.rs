//! Rule and policy evaluation

use crate::config::EvaluatorConfig;
use crate::types::{FailedCondition, PolicyEvaluationResult, RuleEvaluationResult};
use regex::RegexBuilder;
use serde_json::Value;
use warrant_domain::{
    ConditionOperator, EvaluationContext, Policy, PolicyRule, RuleCondition, ValidationError,
};

/// Evaluates rules and policies against an [`EvaluationContext`]
///
/// Evaluation is pure: the context is only read, nothing is persisted, and
/// a condition that cannot be evaluated (missing field, wrong type, bad
/// pattern) simply fails to match.
#[derive(Debug, Clone, Default)]
pub struct PolicyEvaluator {
    config: EvaluatorConfig,
}

impl PolicyEvaluator {
    /// Create an evaluator with the given limits
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Create an evaluator with default limits
    pub fn default_config() -> Self {
        Self::new(EvaluatorConfig::default())
    }

    /// Active limits
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Evaluate every condition of `rule`
    ///
    /// The rule matches only if all conditions hold; every failing condition
    /// is reported, not just the first.
    pub fn evaluate_rule(&self, rule: &PolicyRule, context: &EvaluationContext) -> RuleEvaluationResult {
        let failed_conditions: Vec<FailedCondition> = rule
            .conditions
            .iter()
            .filter_map(|condition| self.evaluate_condition(condition, context).err())
            .collect();

        RuleEvaluationResult {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            effect: rule.effect,
            matched: failed_conditions.is_empty(),
            failed_conditions,
        }
    }

    /// Evaluate `policy`; its first matching rule by priority decides
    pub fn evaluate_policy(&self, policy: &Policy, context: &EvaluationContext) -> PolicyEvaluationResult {
        let rule_results: Vec<RuleEvaluationResult> = policy
            .rules_by_priority()
            .into_iter()
            .map(|rule| self.evaluate_rule(rule, context))
            .collect();

        let applied = rule_results.iter().find(|r| r.matched);

        PolicyEvaluationResult {
            policy_id: policy.id.clone(),
            policy_version: policy.version.clone(),
            policy_priority: policy.priority,
            decision: applied.map(|r| r.effect),
            applied_rule: applied.map(|r| r.rule_id.clone()),
            rule_results,
        }
    }

    /// Check one condition
    pub fn evaluate_condition(
        &self,
        condition: &RuleCondition,
        context: &EvaluationContext,
    ) -> Result<(), FailedCondition> {
        let resolved = context.resolve(&condition.field);
        let actual = resolved.as_deref();

        let fail = |reason: String| FailedCondition {
            field: condition.field.clone(),
            operator: condition.operator,
            expected: condition.value.clone(),
            actual: actual.cloned(),
            reason,
        };

        if condition.operator == ConditionOperator::Exists {
            let present = actual.map_or(false, |v| !v.is_null());
            // `exists: false` asks for absence
            let wanted = condition.value.as_bool().unwrap_or(true);
            return if present == wanted {
                Ok(())
            } else if wanted {
                Err(fail("field is absent".to_string()))
            } else {
                Err(fail("field is present".to_string()))
            };
        }

        let Some(actual) = actual else {
            return Err(fail("field is absent".to_string()));
        };
        let expected = &condition.value;

        let holds = match condition.operator {
            ConditionOperator::Equals => values_equal(actual, expected),
            ConditionOperator::NotEquals => !values_equal(actual, expected),
            ConditionOperator::In | ConditionOperator::NotIn => {
                let Some(candidates) = expected.as_array() else {
                    return Err(fail("condition value is not an array".to_string()));
                };
                let member = candidates.iter().any(|c| values_equal(actual, c));
                member == (condition.operator == ConditionOperator::In)
            }
            ConditionOperator::GreaterThan | ConditionOperator::LessThan => {
                let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) else {
                    return Err(fail("numeric comparison on a non-number".to_string()));
                };
                if condition.operator == ConditionOperator::GreaterThan {
                    a > b
                } else {
                    a < b
                }
            }
            ConditionOperator::Contains => match (actual, expected) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
                (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
                _ => return Err(fail("contains needs a string or array field".to_string())),
            },
            ConditionOperator::Matches => {
                let (Some(subject), Some(pattern)) = (actual.as_str(), expected.as_str()) else {
                    return Err(fail("matches needs string field and pattern".to_string()));
                };
                match self.compile(pattern) {
                    Ok(regex) => regex.is_match(subject),
                    Err(reason) => return Err(fail(reason)),
                }
            }
            ConditionOperator::Exists => unreachable!("handled above"),
        };

        if holds {
            Ok(())
        } else {
            Err(fail(format!("{} {} did not hold", condition.field, condition.operator)))
        }
    }

    /// Reject `matches` patterns that are too long or do not compile
    pub fn check_patterns(&self, policy: &Policy) -> Result<(), ValidationError> {
        for (ri, rule) in policy.rules.iter().enumerate() {
            for (ci, condition) in rule.conditions.iter().enumerate() {
                if condition.operator != ConditionOperator::Matches {
                    continue;
                }
                if let Some(pattern) = condition.value.as_str() {
                    self.compile(pattern).map_err(|reason| {
                        ValidationError::invalid_value(
                            format!("rules[{}].conditions[{}].value", ri, ci),
                            "valid regular expression",
                            reason,
                        )
                    })?;
                }
            }
        }
        Ok(())
    }

    fn compile(&self, pattern: &str) -> Result<regex::Regex, String> {
        if pattern.len() > self.config.max_pattern_length {
            return Err(format!(
                "pattern is {} bytes, limit is {}",
                pattern.len(),
                self.config.max_pattern_length
            ));
        }
        RegexBuilder::new(pattern)
            .size_limit(self.config.regex_size_limit)
            .build()
            .map_err(|e| format!("invalid pattern: {}", e))
    }
}

/// JSON equality that treats `1` and `1.0` as the same number
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}
