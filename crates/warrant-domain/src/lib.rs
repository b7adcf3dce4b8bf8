//! Warrant Domain Layer
//!
//! Core value objects and trait interfaces for governing AI-agent actions.
//! Every other crate in the workspace depends on these types.
//!
//! ## Key Concepts
//!
//! - **Decision**: a proposed consequential action moving through an
//!   approval and execution lifecycle
//! - **Policy**: a versioned, prioritized set of allow/deny/require-approval rules
//! - **Evaluation context**: subject, action, resource and environment facts
//!   a policy is tested against
//! - **Provenance entry**: one append-only, hash-linked audit record
//!
//! ## Architecture
//!
//! - Pure logic only; no I/O
//! - Identifiers are newtypes so they cannot be mixed up
//! - Storage is reached through the traits in [`traits`]

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod decision;
pub mod error;
pub mod ids;
pub mod policy;
pub mod provenance;
pub mod traits;

// Re-exports for convenience
pub use context::EvaluationContext;
pub use decision::{Decision, DecisionOutcome, DecisionStatus, NewDecision, PolicyRef, RiskLevel};
pub use error::{ValidationCode, ValidationError};
pub use ids::{DecisionId, PolicyId, ProvenanceId, Timestamp};
pub use policy::{
    ConditionOperator, Policy, PolicyEffect, PolicyRule, PolicyStatus, RuleCondition,
};
pub use provenance::{
    NewProvenanceEntry, ProvenanceEntry, ScannedEntry, SourceType, UndecodableEntry, GENESIS_HASH,
};
