//! Warrant Policy Simulator
//!
//! Exercises policies against hypothetical contexts without touching any
//! durable state.
//!
//! # Overview
//!
//! Policy authors use the simulator before activating a change: to see how a
//! set of policies would decide one request, to check a policy against a
//! suite of scenarios with expected outcomes, to measure which rules those
//! scenarios exercise, and to diff two versions of a policy.
//!
//! # Key Features
//!
//! - **Dry run**: aggregate any policies (drafts included) and explain the result
//! - **Simulation**: pass/fail per scenario, per-rule match counts, coverage
//! - **Comparison**: rule-level structural diff plus behavioral diff
//! - **Scenario generation**: back-solve one scenario per rule plus a
//!   default-deny scenario
//!
//! # Example Usage
//!
//! ```
//! use warrant_domain::{ConditionOperator, Policy, PolicyEffect, PolicyRule, RuleCondition};
//! use warrant_simulator::PolicySimulator;
//!
//! let policy = Policy::new("exports", "Data exports").with_rule(
//!     PolicyRule::new("deny-pii", "No PII exports", PolicyEffect::Deny)
//!         .with_condition(RuleCondition::new("resource.tags", ConditionOperator::Contains, "pii")),
//! );
//!
//! let simulator = PolicySimulator::default();
//! let scenarios = simulator.generate_scenarios(&policy).unwrap();
//! let report = simulator.simulate_policy(&policy, &scenarios).unwrap();
//!
//! assert!(report.all_passed());
//! assert_eq!(report.coverage.coverage_percent, 100.0);
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod scenarios;
mod simulator;
mod types;

#[cfg(test)]
mod tests;

pub use config::SimulatorConfig;
pub use error::{Result, SimulatorError};
pub use scenarios::{default_deny_scenario, scenario_for_rule, UNMATCHED_ACTION};
pub use simulator::PolicySimulator;
pub use types::{
    BehavioralDifference, CoverageReport, DryRunResult, FieldDifference, PolicyComparison,
    RuleChange, Scenario, ScenarioResult, SimulationReport, StructuralDiff,
};
