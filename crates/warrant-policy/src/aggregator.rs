//! Combining verdicts from many policies

use crate::evaluator::PolicyEvaluator;
use crate::types::{AggregateEvaluationResult, EvaluationOptions, PolicyEvaluationResult};
use tracing::debug;
use warrant_domain::{EvaluationContext, Policy, PolicyEffect, PolicyId, Timestamp};

impl PolicyEvaluator {
    /// Evaluate `policies` and fold their verdicts into one effect
    ///
    /// Policies that are not currently effective are skipped unless the
    /// options bypass the filter. The rest run in descending policy priority
    /// (ties by id) and fold as deny > require_approval > allow:
    ///
    /// - the first deny ends the evaluation
    /// - otherwise the first require_approval stands
    /// - allow only when nothing stronger matched
    /// - when nothing matched at all the result is deny with no deciding policy
    pub fn evaluate_policies(
        &self,
        policies: &[Policy],
        context: &EvaluationContext,
        options: &EvaluationOptions,
    ) -> AggregateEvaluationResult {
        let now = options.now.unwrap_or_else(Timestamp::now);

        let mut candidates: Vec<&Policy> = policies
            .iter()
            .filter(|p| options.bypass_effective_filter || p.is_effective_at(now))
            .collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

        let mut policy_results: Vec<PolicyEvaluationResult> = Vec::with_capacity(candidates.len());
        let mut verdict: Option<(PolicyEffect, PolicyId, Option<String>)> = None;

        for policy in candidates {
            let result = self.evaluate_policy(policy, context);
            let stronger = match (result.decision, &verdict) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(effect), Some((current, _, _))) => effect > *current,
            };
            if stronger {
                if let Some(effect) = result.decision {
                    verdict = Some((effect, result.policy_id.clone(), result.applied_rule.clone()));
                }
            }

            let denied = result.decision == Some(PolicyEffect::Deny);
            policy_results.push(result);
            if denied {
                break;
            }
        }

        let (final_decision, deciding_policy, deciding_rule) = match verdict {
            Some((effect, policy, rule)) => (effect, Some(policy), rule),
            None => (PolicyEffect::Deny, None, None),
        };

        debug!(
            decision = %final_decision,
            deciding_policy = ?deciding_policy,
            evaluated = policy_results.len(),
            "Aggregated policy verdicts"
        );

        AggregateEvaluationResult {
            final_decision,
            deciding_policy,
            deciding_rule,
            policy_results,
            evaluated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warrant_domain::{ConditionOperator, PolicyRule, PolicyStatus, RuleCondition};

    fn policy(id: &str, priority: u32, effect: PolicyEffect) -> Policy {
        Policy::new(id, id)
            .with_priority(priority)
            .with_status(PolicyStatus::Active)
            .with_rule(
                PolicyRule::new(format!("{}-rule", id), "rule", effect)
                    .with_condition(RuleCondition::new("action", ConditionOperator::Equals, "deploy")),
            )
    }

    fn deploy() -> EvaluationContext {
        EvaluationContext::new("deploy")
    }

    #[test]
    fn test_deny_wins_regardless_of_input_order() {
        let evaluator = PolicyEvaluator::default_config();
        let allow = policy("allow", 10, PolicyEffect::Allow);
        let review = policy("review", 20, PolicyEffect::RequireApproval);
        let deny = policy("deny", 30, PolicyEffect::Deny);

        let orders = [
            vec![allow.clone(), review.clone(), deny.clone()],
            vec![deny.clone(), allow.clone(), review.clone()],
            vec![review.clone(), deny.clone(), allow.clone()],
        ];
        for policies in orders {
            let result = evaluator.evaluate_policies(&policies, &deploy(), &EvaluationOptions::default());
            assert_eq!(result.final_decision, PolicyEffect::Deny);
            assert_eq!(result.deciding_policy, Some(PolicyId::new("deny")));
        }
    }

    #[test]
    fn test_low_priority_deny_still_wins() {
        let evaluator = PolicyEvaluator::default_config();
        let policies = vec![
            policy("allow", 50, PolicyEffect::Allow),
            policy("deny", 1, PolicyEffect::Deny),
        ];
        let result = evaluator.evaluate_policies(&policies, &deploy(), &EvaluationOptions::default());
        assert_eq!(result.final_decision, PolicyEffect::Deny);
        assert_eq!(result.policy_results.len(), 2);
    }

    #[test]
    fn test_deny_short_circuits() {
        let evaluator = PolicyEvaluator::default_config();
        let policies = vec![
            policy("deny", 30, PolicyEffect::Deny),
            policy("allow", 10, PolicyEffect::Allow),
        ];
        let result = evaluator.evaluate_policies(&policies, &deploy(), &EvaluationOptions::default());
        assert_eq!(result.policy_results.len(), 1);
    }

    #[test]
    fn test_first_require_approval_stands() {
        let evaluator = PolicyEvaluator::default_config();
        let policies = vec![
            policy("allow", 40, PolicyEffect::Allow),
            policy("review-low", 5, PolicyEffect::RequireApproval),
            policy("review-high", 20, PolicyEffect::RequireApproval),
        ];
        let result = evaluator.evaluate_policies(&policies, &deploy(), &EvaluationOptions::default());
        assert_eq!(result.final_decision, PolicyEffect::RequireApproval);
        assert_eq!(result.deciding_policy, Some(PolicyId::new("review-high")));
        assert_eq!(result.deciding_rule.as_deref(), Some("review-high-rule"));
    }

    #[test]
    fn test_allow_when_nothing_stronger() {
        let evaluator = PolicyEvaluator::default_config();
        let policies = vec![
            policy("allow-a", 5, PolicyEffect::Allow),
            policy("allow-b", 9, PolicyEffect::Allow),
        ];
        let result = evaluator.evaluate_policies(&policies, &deploy(), &EvaluationOptions::default());
        assert!(result.is_allowed());
        assert_eq!(result.deciding_policy, Some(PolicyId::new("allow-b")));
    }

    #[test]
    fn test_default_deny_when_nothing_matches() {
        let evaluator = PolicyEvaluator::default_config();
        let policies = vec![policy("allow", 10, PolicyEffect::Allow)];
        let result = evaluator.evaluate_policies(
            &policies,
            &EvaluationContext::new("read"),
            &EvaluationOptions::default(),
        );
        assert_eq!(result.final_decision, PolicyEffect::Deny);
        assert!(result.deciding_policy.is_none());
        assert!(result.is_default_deny());
    }

    #[test]
    fn test_no_policies_is_default_deny() {
        let result = PolicyEvaluator::default_config().evaluate_policies(
            &[],
            &deploy(),
            &EvaluationOptions::default(),
        );
        assert!(result.is_default_deny());
        assert!(result.policy_results.is_empty());
    }

    #[test]
    fn test_ineffective_policies_are_skipped_unless_bypassed() {
        let evaluator = PolicyEvaluator::default_config();
        let mut expired = policy("expired-allow", 10, PolicyEffect::Allow);
        expired.effective_to = Some(Timestamp::from_millis(1_000));
        let draft = policy("draft-allow", 10, PolicyEffect::Allow).with_status(PolicyStatus::Draft);
        let policies = vec![expired, draft];

        let at = EvaluationOptions::default().at(Timestamp::from_millis(5_000));
        let filtered = evaluator.evaluate_policies(&policies, &deploy(), &at);
        assert!(filtered.is_default_deny());
        assert_eq!(filtered.evaluated_at, Timestamp::from_millis(5_000));

        let bypassed = evaluator.evaluate_policies(
            &policies,
            &deploy(),
            &EvaluationOptions::bypassed().at(Timestamp::from_millis(5_000)),
        );
        assert!(bypassed.is_allowed());
        assert_eq!(bypassed.policy_results.len(), 2);
    }

    #[test]
    fn test_equal_priority_ties_break_by_id() {
        let evaluator = PolicyEvaluator::default_config();
        let policies = vec![
            policy("b-review", 10, PolicyEffect::RequireApproval),
            policy("a-review", 10, PolicyEffect::RequireApproval),
        ];
        let result = evaluator.evaluate_policies(&policies, &deploy(), &EvaluationOptions::default());
        assert_eq!(result.deciding_policy, Some(PolicyId::new("a-review")));
    }
}
