//! Integration tests for the Simulator

#[cfg(test)]
mod tests {
    use crate::{PolicySimulator, Scenario, SimulatorConfig, SimulatorError};
    use semver::Version;
    use serde_json::json;
    use warrant_domain::traits::PolicyStore;
    use warrant_domain::{
        ConditionOperator, EvaluationContext, Policy, PolicyEffect, PolicyId, PolicyRule,
        PolicyStatus, RuleCondition, ValidationCode,
    };
    use warrant_policy::PolicyEvaluator;
    use warrant_store::MemoryStore;

    fn refunds() -> Policy {
        Policy::new("refunds", "Refunds")
            .with_priority(10)
            .with_rule(
                PolicyRule::new("deny-huge", "Huge refunds", PolicyEffect::Deny)
                    .with_condition(RuleCondition::new("resource.amount", ConditionOperator::GreaterThan, 10_000))
                    .with_priority(30),
            )
            .with_rule(
                PolicyRule::new("review-large", "Large refunds", PolicyEffect::RequireApproval)
                    .with_condition(RuleCondition::new("resource.amount", ConditionOperator::GreaterThan, 500))
                    .with_priority(20),
            )
            .with_rule(
                PolicyRule::new("allow-support", "Support refunds", PolicyEffect::Allow)
                    .with_condition(RuleCondition::new("subject.role", ConditionOperator::Equals, "support"))
                    .with_priority(10),
            )
    }

    fn refund(role: &str, amount: i64) -> EvaluationContext {
        EvaluationContext::new("refund.issue")
            .with_subject("role", role)
            .with_resource("amount", amount)
    }

    #[test]
    fn test_dry_run_explains_decision() {
        let simulator = PolicySimulator::default();
        let outcome = simulator.dry_run(&[refunds()], &refund("support", 800)).unwrap();

        assert_eq!(outcome.result.final_decision, PolicyEffect::RequireApproval);
        assert!(outcome.explanation[0].contains("effectiveness filter bypassed"));
        assert!(outcome
            .explanation
            .iter()
            .any(|line| line.contains("rule review-large matched -> require_approval")));
        assert!(outcome
            .explanation
            .iter()
            .any(|line| line.contains("deny-huge") && line.contains("failed")));
        assert_eq!(
            outcome.explanation.last().unwrap(),
            "Final decision: require_approval (deciding policy: refunds)"
        );
    }

    #[test]
    fn test_dry_run_includes_drafts() {
        let policy = refunds();
        assert_eq!(policy.status, PolicyStatus::Draft);
        let outcome = PolicySimulator::default()
            .dry_run(&[policy], &refund("support", 10))
            .unwrap();
        assert!(outcome.result.is_allowed());
    }

    #[test]
    fn test_dry_run_default_deny_is_explained() {
        let outcome = PolicySimulator::default()
            .dry_run(&[refunds()], &refund("intern", 10))
            .unwrap();
        assert!(outcome.result.is_default_deny());
        assert!(outcome.explanation.last().unwrap().contains("default deny"));
    }

    #[test]
    fn test_simulation_pass_fail_and_coverage() {
        let simulator = PolicySimulator::default();
        let scenarios = vec![
            Scenario::new("small support refund", refund("support", 50)).expecting(PolicyEffect::Allow),
            Scenario::new("large refund", refund("support", 900)).expecting(PolicyEffect::RequireApproval),
            Scenario::new("wrong expectation", refund("support", 900)).expecting(PolicyEffect::Allow),
            Scenario::new("no expectation", refund("intern", 1)),
        ];

        let report = simulator.simulate_policy(&refunds(), &scenarios).unwrap();
        assert_eq!(report.passed, 3);
        assert_eq!(report.failed, 1);
        assert!(!report.scenarios[2].passed);
        assert_eq!(report.scenarios[3].actual, PolicyEffect::Deny);

        assert_eq!(report.coverage.total_rules, 3);
        assert_eq!(report.coverage.covered_rules, 2);
        assert_eq!(report.coverage.uncovered_rules, vec!["deny-huge"]);
        assert_eq!(report.coverage.rule_match_counts["allow-support"], 3);
        assert_eq!(report.coverage.rule_match_counts["review-large"], 2);
        assert!((report.coverage.coverage_percent - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_generated_scenarios_cover_every_rule() {
        let simulator = PolicySimulator::default();
        let policy = refunds();
        let scenarios = simulator.generate_scenarios(&policy).unwrap();

        assert_eq!(scenarios.len(), 4);
        assert_eq!(scenarios.last().unwrap().name, "default deny");

        let report = simulator.simulate_policy(&policy, &scenarios).unwrap();
        assert_eq!(report.coverage.coverage_percent, 100.0);
        // The default-deny scenario matches nothing
        assert!(report.scenarios.last().unwrap().passed);
    }

    #[test]
    fn test_scenario_bound_enforced() {
        let config = SimulatorConfig {
            max_scenarios: 1,
            ..SimulatorConfig::default()
        };
        let simulator = PolicySimulator::new(PolicyEvaluator::default_config(), config).unwrap();
        let scenarios = vec![
            Scenario::new("a", refund("support", 1)),
            Scenario::new("b", refund("support", 2)),
        ];

        match simulator.simulate_policy(&refunds(), &scenarios) {
            Err(SimulatorError::Validation(e)) => {
                assert_eq!(e.code, ValidationCode::OutOfRange);
                assert_eq!(e.field, "scenarios");
            }
            other => panic!("expected out of range, got {:?}", other),
        }
    }

    #[test]
    fn test_rule_bound_enforced() {
        let config = SimulatorConfig {
            max_rules_per_policy: 2,
            ..SimulatorConfig::default()
        };
        let simulator = PolicySimulator::new(PolicyEvaluator::default_config(), config).unwrap();
        assert!(simulator.generate_scenarios(&refunds()).is_err());
        assert!(simulator.dry_run(&[refunds()], &refund("support", 1)).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimulatorConfig {
            max_policies: 0,
            ..SimulatorConfig::default()
        };
        assert!(matches!(
            PolicySimulator::new(PolicyEvaluator::default_config(), config),
            Err(SimulatorError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_rule_ids_rejected_before_coverage() {
        let mut policy = refunds();
        policy.rules[1].id = "deny-huge".into();
        let scenarios = vec![Scenario::new("large refund", refund("support", 900))];

        match PolicySimulator::default().simulate_policy(&policy, &scenarios) {
            Err(SimulatorError::Validation(e)) => {
                assert_eq!(e.code, ValidationCode::Duplicate);
                assert_eq!(e.actual, "deny-huge");
            }
            other => panic!("expected duplicate rule id, got {:?}", other),
        }

        assert!(PolicySimulator::default()
            .compare_policies(&refunds(), &policy, None)
            .is_err());
    }

    #[test]
    fn test_generated_default_deny_fails_on_catch_all_rule() {
        let simulator = PolicySimulator::default();
        let policy = Policy::new("deploys", "Deploys").with_rule(
            PolicyRule::new("allow-non-deploys", "Anything but deploys", PolicyEffect::Allow)
                .with_condition(RuleCondition::new("action", ConditionOperator::NotEquals, "deploy")),
        );

        let scenarios = simulator.generate_scenarios(&policy).unwrap();
        let report = simulator.simulate_policy(&policy, &scenarios).unwrap();
        let default_deny = report.scenarios.last().unwrap();
        assert_eq!(default_deny.name, "default deny");
        assert!(!default_deny.passed);
        assert_eq!(default_deny.actual, PolicyEffect::Allow);
    }

    #[test]
    fn test_compare_structural_and_behavioral() {
        let simulator = PolicySimulator::default();
        let first = refunds();

        let mut second = refunds().with_version(Version::new(1, 1, 0)).with_priority(20);
        second.rules.retain(|r| r.id != "deny-huge");
        second.rules[0].conditions[0].value = json!(1000);
        second.rules.push(
            PolicyRule::new("deny-weekend", "No weekend refunds", PolicyEffect::Deny)
                .with_condition(RuleCondition::new("environment.weekend", ConditionOperator::Equals, true)),
        );

        let scenarios = vec![
            Scenario::new("800", refund("support", 800)),
            Scenario::new("20000", refund("support", 20_000)),
            Scenario::new("10", refund("support", 10)),
        ];
        let comparison = simulator
            .compare_policies(&first, &second, Some(&scenarios))
            .unwrap();

        let diff = &comparison.structural;
        assert_eq!(diff.only_in_first, vec!["deny-huge"]);
        assert_eq!(diff.only_in_second, vec!["deny-weekend"]);
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].rule_id, "review-large");
        assert_eq!(diff.modified[0].differences[0].field, "conditions");
        assert_eq!(diff.policy_changes.len(), 1);
        assert_eq!(diff.policy_changes[0].field, "priority");

        assert_eq!(comparison.scenarios_compared, 3);
        let changed: Vec<&str> = comparison.behavioral.iter().map(|d| d.scenario.as_str()).collect();
        assert_eq!(changed, vec!["800", "20000"]);
        assert_eq!(comparison.behavioral[0].first, PolicyEffect::RequireApproval);
        assert_eq!(comparison.behavioral[0].second, PolicyEffect::Allow);
    }

    #[test]
    fn test_compare_identical_policies() {
        let comparison = PolicySimulator::default()
            .compare_policies(&refunds(), &refunds(), None)
            .unwrap();
        assert!(comparison.structural.is_empty());
        assert_eq!(comparison.scenarios_compared, 0);
        assert!(comparison.behavioral.is_empty());
    }

    #[test]
    fn test_store_backed_simulation_issues_no_writes() {
        let mut store = MemoryStore::new();
        store.upsert_policy(&refunds().with_status(PolicyStatus::Active)).unwrap();
        let mut archived = refunds().with_version(Version::new(0, 9, 0));
        archived.status = PolicyStatus::Archived;
        archived.rules.clear();
        store.upsert_policy(&archived).unwrap();
        let writes = store.write_count();

        let simulator = PolicySimulator::default();
        let dry = simulator.dry_run_stored(&store, &refund("support", 10)).unwrap();
        assert!(dry.result.is_allowed());
        assert_eq!(dry.result.policy_results.len(), 1);

        let scenarios = simulator.generate_scenarios(&refunds()).unwrap();
        let report = simulator
            .simulate_stored(&store, &PolicyId::new("refunds"), &Version::new(1, 0, 0), &scenarios)
            .unwrap();
        assert!(report.all_passed());

        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn test_simulate_missing_stored_policy() {
        let store = MemoryStore::new();
        let err = PolicySimulator::default()
            .simulate_stored(&store, &PolicyId::new("ghost"), &Version::new(1, 0, 0), &[])
            .unwrap_err();
        assert!(matches!(err, SimulatorError::Validation(e) if e.code == ValidationCode::NotFound));
    }
}
