//! Warrant Policy Engine
//!
//! Evaluates agent actions against prioritized allow, deny and
//! require-approval rules.
//!
//! The engine provides:
//! - Rule and policy evaluation against an [`EvaluationContext`](warrant_domain::EvaluationContext)
//! - Fail-closed aggregation across many policies
//! - A versioned [`PolicyRegistry`] with draft, active and archived states
//! - `{{name}}` placeholder templates
//!
//! # Examples
//!
//! ```
//! use warrant_domain::{
//!     ConditionOperator, EvaluationContext, Policy, PolicyEffect, PolicyRule, PolicyStatus,
//!     RuleCondition,
//! };
//! use warrant_policy::{EvaluationOptions, PolicyEvaluator};
//!
//! let policy = Policy::new("deploys", "Production deploys")
//!     .with_status(PolicyStatus::Active)
//!     .with_rule(
//!         PolicyRule::new("review-prod", "Review production", PolicyEffect::RequireApproval)
//!             .with_condition(RuleCondition::new("resource.env", ConditionOperator::Equals, "prod")),
//!     );
//!
//! let context = EvaluationContext::new("deploy").with_resource("env", "prod");
//! let result = PolicyEvaluator::default_config().evaluate_policies(
//!     &[policy],
//!     &context,
//!     &EvaluationOptions::default(),
//! );
//! assert_eq!(result.final_decision, PolicyEffect::RequireApproval);
//! ```

#![warn(missing_docs)]

mod aggregator;
mod config;
mod error;
mod evaluator;
mod registry;
mod template;
mod types;

pub use config::EvaluatorConfig;
pub use error::PolicyError;
pub use evaluator::PolicyEvaluator;
pub use registry::PolicyRegistry;
pub use template::{substitute, PolicyTemplate, TemplateVariable};
pub use types::{
    AggregateEvaluationResult, EvaluationOptions, FailedCondition, PolicyEvaluationResult,
    RuleEvaluationResult,
};
