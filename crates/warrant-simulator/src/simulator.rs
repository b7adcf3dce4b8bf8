//! Core simulation logic

use crate::config::SimulatorConfig;
use crate::error::{Result, SimulatorError};
use crate::scenarios::{default_deny_scenario, scenario_for_rule};
use crate::types::{
    BehavioralDifference, CoverageReport, DryRunResult, FieldDifference, PolicyComparison,
    RuleChange, Scenario, ScenarioResult, SimulationReport, StructuralDiff,
};
use semver::Version;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;
use warrant_domain::traits::{PolicyQuery, PolicyStore};
use warrant_domain::{EvaluationContext, Policy, PolicyEffect, PolicyId, PolicyRule, ValidationError};
use warrant_policy::{AggregateEvaluationResult, EvaluationOptions, PolicyEvaluator};

/// Exercises policies against hypothetical contexts
///
/// The simulator is read-only: it never writes policies, decisions or
/// ledger entries, and the store-backed entry points only read.
#[derive(Debug, Clone, Default)]
pub struct PolicySimulator {
    evaluator: PolicyEvaluator,
    config: SimulatorConfig,
}

impl PolicySimulator {
    /// Create a new simulator
    pub fn new(evaluator: PolicyEvaluator, config: SimulatorConfig) -> Result<Self> {
        config.validate().map_err(SimulatorError::Config)?;
        Ok(Self { evaluator, config })
    }

    /// Active bounds
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Aggregate `policies` against `context`, ignoring status and windows
    pub fn dry_run(&self, policies: &[Policy], context: &EvaluationContext) -> Result<DryRunResult> {
        self.check_policy_count(policies.len())?;
        for policy in policies {
            self.check_rule_count(policy)?;
        }

        let result = self
            .evaluator
            .evaluate_policies(policies, context, &EvaluationOptions::bypassed());
        let explanation = explain(policies.len(), &result);

        info!(
            policies = policies.len(),
            decision = %result.final_decision,
            "Dry run complete"
        );
        Ok(DryRunResult { result, explanation })
    }

    /// Dry run against every non-archived stored policy
    pub fn dry_run_stored<S: PolicyStore>(
        &self,
        store: &S,
        context: &EvaluationContext,
    ) -> Result<DryRunResult> {
        let policies: Vec<Policy> = store
            .query_policies(&PolicyQuery::default())
            .map_err(|e| SimulatorError::Store(Box::new(e)))?
            .into_iter()
            .filter(|p| p.status != warrant_domain::PolicyStatus::Archived)
            .collect();
        self.dry_run(&policies, context)
    }

    /// Run `scenarios` against one policy and report pass/fail and coverage
    ///
    /// The policy is evaluated on its own with the effectiveness filter
    /// bypassed, so a draft can be simulated before activation. A scenario
    /// without an expectation always passes. Coverage is keyed by rule id,
    /// so the policy must be structurally valid.
    pub fn simulate_policy(&self, policy: &Policy, scenarios: &[Scenario]) -> Result<SimulationReport> {
        self.check_rule_count(policy)?;
        policy.validate()?;
        self.check_scenario_count(scenarios.len())?;

        let ordered: Vec<&PolicyRule> = policy.rules_by_priority();
        let mut counts: BTreeMap<String, usize> =
            ordered.iter().map(|r| (r.id.clone(), 0)).collect();
        let mut results = Vec::with_capacity(scenarios.len());

        for scenario in scenarios {
            let outcome = self.evaluate_alone(policy, &scenario.context);
            let mut matched_rules = Vec::new();
            let mut applied_rule = None;
            if let Some(policy_result) = outcome.policy_results.first() {
                applied_rule = policy_result.applied_rule.clone();
                for rule in policy_result.matched_rules() {
                    *counts.entry(rule.rule_id.clone()).or_insert(0) += 1;
                    matched_rules.push(rule.rule_id.clone());
                }
            }

            let actual = outcome.final_decision;
            results.push(ScenarioResult {
                name: scenario.name.clone(),
                expected: scenario.expected_decision,
                actual,
                passed: scenario.expected_decision.map_or(true, |e| e == actual),
                applied_rule,
                matched_rules,
            });
        }

        let uncovered_rules: Vec<String> = ordered
            .iter()
            .filter(|r| counts.get(&r.id).copied().unwrap_or(0) == 0)
            .map(|r| r.id.clone())
            .collect();
        let total_rules = counts.len();
        let covered_rules = total_rules - uncovered_rules.len();
        let coverage_percent = if total_rules == 0 {
            100.0
        } else {
            covered_rules as f64 * 100.0 / total_rules as f64
        };

        let passed = results.iter().filter(|r| r.passed).count();
        let failed = results.len() - passed;

        info!(
            policy = %policy.id,
            scenarios = results.len(),
            passed,
            failed,
            coverage = coverage_percent,
            "Simulation complete"
        );

        Ok(SimulationReport {
            policy_id: policy.id.clone(),
            policy_version: policy.version.clone(),
            scenarios: results,
            passed,
            failed,
            coverage: CoverageReport {
                total_rules,
                covered_rules,
                uncovered_rules,
                rule_match_counts: counts,
                coverage_percent,
            },
        })
    }

    /// Simulate a stored policy version
    pub fn simulate_stored<S: PolicyStore>(
        &self,
        store: &S,
        id: &PolicyId,
        version: &Version,
        scenarios: &[Scenario],
    ) -> Result<SimulationReport> {
        let policy = store
            .get_policy(id, version)
            .map_err(|e| SimulatorError::Store(Box::new(e)))?
            .ok_or_else(|| ValidationError::not_found("policy", format!("{}@{}", id, version)))?;
        self.simulate_policy(&policy, scenarios)
    }

    /// Diff two policies by content and, given scenarios, by behavior
    pub fn compare_policies(
        &self,
        first: &Policy,
        second: &Policy,
        scenarios: Option<&[Scenario]>,
    ) -> Result<PolicyComparison> {
        self.check_rule_count(first)?;
        self.check_rule_count(second)?;
        first.validate()?;
        second.validate()?;

        let structural = structural_diff(first, second)?;

        let scenarios = scenarios.unwrap_or(&[]);
        self.check_scenario_count(scenarios.len())?;
        let behavioral: Vec<BehavioralDifference> = scenarios
            .iter()
            .filter_map(|scenario| {
                let a = self.evaluate_alone(first, &scenario.context).final_decision;
                let b = self.evaluate_alone(second, &scenario.context).final_decision;
                (a != b).then(|| BehavioralDifference {
                    scenario: scenario.name.clone(),
                    first: a,
                    second: b,
                })
            })
            .collect();

        info!(
            first = %first.id,
            second = %second.id,
            modified_rules = structural.modified.len(),
            behavioral_differences = behavioral.len(),
            "Policy comparison complete"
        );

        Ok(PolicyComparison {
            first: (first.id.clone(), first.version.clone()),
            second: (second.id.clone(), second.version.clone()),
            structural,
            scenarios_compared: scenarios.len(),
            behavioral,
        })
    }

    /// One scenario per rule, highest priority first, plus a default-deny scenario
    pub fn generate_scenarios(&self, policy: &Policy) -> Result<Vec<Scenario>> {
        self.check_rule_count(policy)?;
        let needed = policy.rules.len() + 1;
        if needed > self.config.max_generated_scenarios {
            return Err(ValidationError::out_of_range(
                "rules",
                format!("<= {} generated scenarios", self.config.max_generated_scenarios),
                needed.to_string(),
            )
            .into());
        }

        let mut scenarios: Vec<Scenario> = policy
            .rules_by_priority()
            .into_iter()
            .map(scenario_for_rule)
            .collect();
        scenarios.push(default_deny_scenario());
        Ok(scenarios)
    }

    fn evaluate_alone(&self, policy: &Policy, context: &EvaluationContext) -> AggregateEvaluationResult {
        self.evaluator.evaluate_policies(
            std::slice::from_ref(policy),
            context,
            &EvaluationOptions::bypassed(),
        )
    }

    fn check_policy_count(&self, count: usize) -> Result<()> {
        if count > self.config.max_policies {
            return Err(ValidationError::out_of_range(
                "policies",
                format!("<= {}", self.config.max_policies),
                count.to_string(),
            )
            .into());
        }
        Ok(())
    }

    fn check_rule_count(&self, policy: &Policy) -> Result<()> {
        if policy.rules.len() > self.config.max_rules_per_policy {
            return Err(ValidationError::out_of_range(
                format!("{}.rules", policy.id),
                format!("<= {}", self.config.max_rules_per_policy),
                policy.rules.len().to_string(),
            )
            .into());
        }
        Ok(())
    }

    fn check_scenario_count(&self, count: usize) -> Result<()> {
        if count > self.config.max_scenarios {
            return Err(ValidationError::out_of_range(
                "scenarios",
                format!("<= {}", self.config.max_scenarios),
                count.to_string(),
            )
            .into());
        }
        Ok(())
    }
}

/// Line-by-line account of an aggregate result
fn explain(given: usize, result: &AggregateEvaluationResult) -> Vec<String> {
    let mut lines = vec![format!(
        "Evaluated {} of {} policies (effectiveness filter bypassed)",
        result.policy_results.len(),
        given
    )];

    for policy in &result.policy_results {
        let header = format!(
            "Policy {} v{} (priority {})",
            policy.policy_id, policy.policy_version, policy.policy_priority
        );
        match (&policy.applied_rule, policy.decision) {
            (Some(rule), Some(effect)) => lines.push(format!("{}: rule {} matched -> {}", header, rule, effect)),
            _ => lines.push(format!("{}: no rule matched", header)),
        }
        for rule in policy.rule_results.iter().filter(|r| !r.matched) {
            for failed in &rule.failed_conditions {
                lines.push(format!(
                    "  rule {}: {} {} {} failed ({})",
                    rule.rule_id, failed.field, failed.operator, failed.expected, failed.reason
                ));
            }
        }
    }

    if result.policy_results.len() < given && result.final_decision == PolicyEffect::Deny {
        lines.push("Remaining policies skipped after deny".to_string());
    }

    match &result.deciding_policy {
        Some(policy) => lines.push(format!(
            "Final decision: {} (deciding policy: {})",
            result.final_decision, policy
        )),
        None => lines.push(format!(
            "Final decision: {} (no rule matched; default deny)",
            result.final_decision
        )),
    }
    lines
}

fn structural_diff(first: &Policy, second: &Policy) -> Result<StructuralDiff> {
    let mut diff = StructuralDiff::default();

    push_if_different(&mut diff.policy_changes, "name", &first.name, &second.name)?;
    push_if_different(&mut diff.policy_changes, "description", &first.description, &second.description)?;
    push_if_different(&mut diff.policy_changes, "priority", &first.priority, &second.priority)?;
    push_if_different(&mut diff.policy_changes, "status", &first.status, &second.status)?;
    push_if_different(&mut diff.policy_changes, "scope", &first.scope, &second.scope)?;
    push_if_different(&mut diff.policy_changes, "jurisdiction", &first.jurisdiction, &second.jurisdiction)?;
    push_if_different(&mut diff.policy_changes, "effectiveFrom", &first.effective_from, &second.effective_from)?;
    push_if_different(&mut diff.policy_changes, "effectiveTo", &first.effective_to, &second.effective_to)?;

    for rule in &first.rules {
        match second.rule(&rule.id) {
            None => diff.only_in_first.push(rule.id.clone()),
            Some(other) => {
                let mut differences = Vec::new();
                push_if_different(&mut differences, "name", &rule.name, &other.name)?;
                push_if_different(&mut differences, "effect", &rule.effect, &other.effect)?;
                push_if_different(&mut differences, "priority", &rule.priority, &other.priority)?;
                push_if_different(&mut differences, "conditions", &rule.conditions, &other.conditions)?;
                if !differences.is_empty() {
                    diff.modified.push(RuleChange {
                        rule_id: rule.id.clone(),
                        differences,
                    });
                }
            }
        }
    }

    diff.only_in_second = second
        .rules
        .iter()
        .filter(|r| first.rule(&r.id).is_none())
        .map(|r| r.id.clone())
        .collect();

    Ok(diff)
}

fn push_if_different<T: Serialize + PartialEq>(
    out: &mut Vec<FieldDifference>,
    field: &str,
    before: &T,
    after: &T,
) -> Result<()> {
    if before != after {
        out.push(FieldDifference {
            field: field.to_string(),
            before: serde_json::to_value(before)?,
            after: serde_json::to_value(after)?,
        });
    }
    Ok(())
}
