//! Simulation inputs and reports

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use warrant_domain::{EvaluationContext, PolicyEffect, PolicyId};
use warrant_policy::AggregateEvaluationResult;

/// A hypothetical context, optionally with the decision it should produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Label shown in reports
    pub name: String,
    /// Facts to evaluate
    pub context: EvaluationContext,
    /// Decision the scenario asserts, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_decision: Option<PolicyEffect>,
}

impl Scenario {
    /// Scenario without an expectation
    pub fn new(name: impl Into<String>, context: EvaluationContext) -> Self {
        Self {
            name: name.into(),
            context,
            expected_decision: None,
        }
    }

    /// Assert the decision this scenario must produce
    pub fn expecting(mut self, decision: PolicyEffect) -> Self {
        self.expected_decision = Some(decision);
        self
    }
}

/// Outcome of a dry run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunResult {
    /// Full aggregate result
    pub result: AggregateEvaluationResult,
    /// Human-readable trace of how the decision was reached
    pub explanation: Vec<String>,
}

/// Outcome of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    /// Scenario label
    pub name: String,
    /// Expected decision, if asserted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<PolicyEffect>,
    /// Decision produced
    pub actual: PolicyEffect,
    /// False only when an expectation was given and not met
    pub passed: bool,
    /// Rule that decided, if any matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_rule: Option<String>,
    /// Every rule that matched
    pub matched_rules: Vec<String>,
}

/// Which rules a scenario set exercised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    /// Rules in the policy
    pub total_rules: usize,
    /// Rules matched by at least one scenario
    pub covered_rules: usize,
    /// Rules no scenario matched, in priority order
    pub uncovered_rules: Vec<String>,
    /// Matches per rule id
    pub rule_match_counts: BTreeMap<String, usize>,
    /// `covered_rules / total_rules` as a percentage; 100 for a rule-less policy
    pub coverage_percent: f64,
}

/// Outcome of simulating one policy over many scenarios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    /// Policy simulated
    pub policy_id: PolicyId,
    /// Version simulated
    pub policy_version: Version,
    /// Per-scenario outcomes, in input order
    pub scenarios: Vec<ScenarioResult>,
    /// Scenarios that passed
    pub passed: usize,
    /// Scenarios that failed their expectation
    pub failed: usize,
    /// Rule coverage
    pub coverage: CoverageReport,
}

impl SimulationReport {
    /// Whether every scenario met its expectation
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// One field that differs between two versions of a rule or policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDifference {
    /// Field name
    pub field: String,
    /// Value in the first policy
    pub before: Value,
    /// Value in the second policy
    pub after: Value,
}

/// A rule present in both policies with different content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleChange {
    /// Rule id shared by both policies
    pub rule_id: String,
    /// Differing fields
    pub differences: Vec<FieldDifference>,
}

/// Rule-level differences between two policies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralDiff {
    /// Policy-level fields that differ (name, priority, status, window)
    pub policy_changes: Vec<FieldDifference>,
    /// Rule ids only the first policy has
    pub only_in_first: Vec<String>,
    /// Rule ids only the second policy has
    pub only_in_second: Vec<String>,
    /// Rules in both with differing content
    pub modified: Vec<RuleChange>,
}

impl StructuralDiff {
    /// Whether the policies have identical content
    pub fn is_empty(&self) -> bool {
        self.policy_changes.is_empty()
            && self.only_in_first.is_empty()
            && self.only_in_second.is_empty()
            && self.modified.is_empty()
    }
}

/// A scenario the two policies decide differently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralDifference {
    /// Scenario label
    pub scenario: String,
    /// Decision under the first policy
    pub first: PolicyEffect,
    /// Decision under the second policy
    pub second: PolicyEffect,
}

/// Outcome of comparing two policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyComparison {
    /// First policy id and version
    pub first: (PolicyId, Version),
    /// Second policy id and version
    pub second: (PolicyId, Version),
    /// Content differences
    pub structural: StructuralDiff,
    /// Scenarios evaluated for the behavioral diff
    pub scenarios_compared: usize,
    /// Scenarios decided differently
    pub behavioral: Vec<BehavioralDifference>,
}
