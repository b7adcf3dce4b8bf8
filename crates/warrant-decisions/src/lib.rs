//! Warrant Decision Repository
//!
//! Creates decisions, moves them through their lifecycle and records every
//! step in the provenance ledger.
//!
//! ## Responsibilities
//!
//! 1. **Proposal**: validate input, default the risk level, persist, and
//!    record a `propose` entry
//! 2. **Lifecycle**: approve, reject, execute, fail and roll back, each as a
//!    single transaction with its ledger entry
//! 3. **Queries**: by status, by proposer, pending, counts per status
//! 4. **Auto-approval advice**: whether same-type history is long and clean
//!    enough to skip a human
//! 5. **Policy attachment**: evaluate effective policies and store the
//!    per-policy outcome on the decision
//!
//! ## Usage
//!
//! ```
//! use warrant_decisions::DecisionRepository;
//! use warrant_domain::{DecisionOutcome, DecisionStatus, NewDecision, RiskLevel};
//! use warrant_store::MemoryStore;
//!
//! let mut repo = DecisionRepository::new(MemoryStore::new());
//!
//! let decision = repo
//!     .create(NewDecision::new("refund", "Refund order 42", "agent:billing").with_risk(RiskLevel::Low))
//!     .unwrap();
//! assert!(!repo.can_auto_approve(&decision).unwrap());
//!
//! repo.approve(decision.id, "alice").unwrap();
//! let executed = repo
//!     .record_execution(decision.id, "agent:billing", DecisionOutcome::Success)
//!     .unwrap();
//! assert_eq!(executed.status, DecisionStatus::Executed);
//!
//! let trace = repo.trace(decision.id).unwrap();
//! assert_eq!(trace.entries.len(), 3);
//! assert!(repo.verify_ledger().unwrap().valid);
//! ```
//!
//! ## Configuration
//!
//! See [`AutoApprovalConfig`] for the precedent thresholds.

#![warn(missing_docs)]

mod config;
mod error;
mod repository;

pub use config::AutoApprovalConfig;
pub use error::{RepositoryError, Result};
pub use repository::{
    decision_ref, policy_refs, source_type_for, AutoApprovalAdvice, DecisionRepository,
    DecisionTrace, SYSTEM_ACTOR,
};
