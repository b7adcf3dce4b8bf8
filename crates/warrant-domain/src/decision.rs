//! Decisions and their lifecycle
//!
//! ```text
//! proposed ──► approved ──► executed ──► rolled_back
//!     │            │
//!     ▼            ▼
//!  rejected      failed
//! ```
//!
//! `rejected`, `failed` and `rolled_back` are terminal.

use crate::ids::{DecisionId, PolicyId, ProvenanceId, Timestamp};
use crate::{ValidationCode, ValidationError};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a decision in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Awaiting approval or rejection
    Proposed,
    /// Cleared for execution
    Approved,
    /// Refused (terminal)
    Rejected,
    /// Carried out
    Executed,
    /// Execution attempted and failed (terminal)
    Failed,
    /// Execution reverted (terminal)
    RolledBack,
}

impl DecisionStatus {
    /// Every status, in lifecycle order
    pub const ALL: [DecisionStatus; 6] = [
        DecisionStatus::Proposed,
        DecisionStatus::Approved,
        DecisionStatus::Rejected,
        DecisionStatus::Executed,
        DecisionStatus::Failed,
        DecisionStatus::RolledBack,
    ];

    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Proposed => "proposed",
            DecisionStatus::Approved => "approved",
            DecisionStatus::Rejected => "rejected",
            DecisionStatus::Executed => "executed",
            DecisionStatus::Failed => "failed",
            DecisionStatus::RolledBack => "rolled_back",
        }
    }

    /// Parse a status from its wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "proposed" => Some(DecisionStatus::Proposed),
            "approved" => Some(DecisionStatus::Approved),
            "rejected" => Some(DecisionStatus::Rejected),
            "executed" => Some(DecisionStatus::Executed),
            "failed" => Some(DecisionStatus::Failed),
            "rolled_back" => Some(DecisionStatus::RolledBack),
            _ => None,
        }
    }

    /// Statuses reachable in one step
    pub fn valid_transitions(&self) -> &'static [DecisionStatus] {
        match self {
            DecisionStatus::Proposed => &[DecisionStatus::Approved, DecisionStatus::Rejected],
            DecisionStatus::Approved => &[DecisionStatus::Executed, DecisionStatus::Failed],
            DecisionStatus::Executed => &[DecisionStatus::RolledBack],
            DecisionStatus::Rejected | DecisionStatus::Failed | DecisionStatus::RolledBack => &[],
        }
    }

    /// Whether `self -> next` is in the transition table
    pub fn is_valid_transition(&self, next: DecisionStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    /// Verb recorded in the ledger when a decision enters this status
    pub fn ledger_action(&self) -> &'static str {
        match self {
            DecisionStatus::Proposed => "propose",
            DecisionStatus::Approved => "approve",
            DecisionStatus::Rejected => "reject",
            DecisionStatus::Executed => "execute",
            DecisionStatus::Failed => "fail",
            DecisionStatus::RolledBack => "rollback",
        }
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecisionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            ValidationError::invalid_value(
                "status",
                "proposed|approved|rejected|executed|failed|rolled_back",
                s,
            )
        })
    }
}

/// Assessed risk of carrying out a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Routine
    Low,
    /// Default
    #[default]
    Medium,
    /// Needs a human
    High,
    /// Needs a human
    Critical,
}

impl RiskLevel {
    /// Wire name of the level
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Parse a level from its wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            ValidationError::invalid_value("riskLevel", "low|medium|high|critical", s)
        })
    }
}

/// Result of executing a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    /// Achieved what was intended
    Success,
    /// Achieved part of what was intended
    Partial,
    /// Did not achieve what was intended
    Failure,
}

impl DecisionOutcome {
    /// Wire name of the outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Success => "success",
            DecisionOutcome::Partial => "partial",
            DecisionOutcome::Failure => "failure",
        }
    }

    /// Parse an outcome from its wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "success" => Some(DecisionOutcome::Success),
            "partial" => Some(DecisionOutcome::Partial),
            "failure" => Some(DecisionOutcome::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecisionOutcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| ValidationError::invalid_value("outcome", "success|partial|failure", s))
    }
}

/// How one policy version bears on a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRef {
    /// Referenced policy
    pub policy_id: PolicyId,
    /// Version that was evaluated
    pub version: Version,
    /// Whether any rule of the policy matched
    pub applicable: bool,
    /// Rules whose requirements the decision satisfies
    #[serde(default)]
    pub satisfied_requirements: Vec<String>,
    /// Rules the decision violates
    #[serde(default)]
    pub violated_requirements: Vec<String>,
}

impl PolicyRef {
    /// Whether the decision violates this policy
    pub fn is_violated(&self) -> bool {
        !self.violated_requirements.is_empty()
    }
}

/// Input for proposing a decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDecision {
    /// Category, used to find precedents (e.g. "refund")
    #[serde(rename = "type")]
    pub decision_type: String,
    /// Short summary
    pub title: String,
    /// Longer explanation
    #[serde(default)]
    pub description: String,
    /// Defaults to medium
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    /// Actor proposing the decision
    pub proposed_by: String,
    /// Knowledge-graph claims the decision relies on
    #[serde(default)]
    pub claim_refs: Vec<String>,
}

impl NewDecision {
    /// Create an input with the required fields
    pub fn new(
        decision_type: impl Into<String>,
        title: impl Into<String>,
        proposed_by: impl Into<String>,
    ) -> Self {
        Self {
            decision_type: decision_type.into(),
            title: title.into(),
            proposed_by: proposed_by.into(),
            ..Default::default()
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the risk level
    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = Some(risk);
        self
    }

    /// Reference a supporting claim
    pub fn with_claim(mut self, claim: impl Into<String>) -> Self {
        self.claim_refs.push(claim.into());
        self
    }

    /// Check required fields
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.decision_type.trim().is_empty() {
            return Err(ValidationError::required("type"));
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::required("title"));
        }
        if self.proposed_by.trim().is_empty() {
            return Err(ValidationError::required("proposedBy"));
        }
        Ok(())
    }
}

/// A proposed consequential action and its lifecycle
///
/// Decisions are values: a transition returns a new `Decision` and leaves the
/// original untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Unique identifier
    pub id: DecisionId,
    /// Category, used to find precedents
    #[serde(rename = "type")]
    pub decision_type: String,
    /// Short summary
    pub title: String,
    /// Longer explanation
    #[serde(default)]
    pub description: String,
    /// Lifecycle position
    pub status: DecisionStatus,
    /// Assessed risk
    pub risk_level: RiskLevel,
    /// Proposing actor
    pub proposed_by: String,
    /// When proposed
    pub proposed_at: Timestamp,
    /// Approving actor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    /// When approved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<Timestamp>,
    /// Rejecting actor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    /// When rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<Timestamp>,
    /// Why it was rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_rationale: Option<String>,
    /// When executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<Timestamp>,
    /// Result of execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DecisionOutcome>,
    /// Supporting knowledge-graph claims
    #[serde(default)]
    pub claim_refs: Vec<String>,
    /// Policies evaluated against the decision
    #[serde(default)]
    pub policy_refs: Vec<PolicyRef>,
    /// Ledger entry that recorded the proposal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_id: Option<ProvenanceId>,
    /// Last status change
    pub updated_at: Timestamp,
}

impl Decision {
    /// Build a proposed decision from validated input
    pub fn propose(input: NewDecision, now: Timestamp) -> Result<Self, ValidationError> {
        input.validate()?;
        Ok(Self {
            id: DecisionId::new(),
            decision_type: input.decision_type.trim().to_string(),
            title: input.title.trim().to_string(),
            description: input.description,
            status: DecisionStatus::Proposed,
            risk_level: input.risk_level.unwrap_or_default(),
            proposed_by: input.proposed_by,
            proposed_at: now,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_rationale: None,
            executed_at: None,
            outcome: None,
            claim_refs: input.claim_refs,
            policy_refs: Vec::new(),
            provenance_id: None,
            updated_at: now,
        })
    }

    /// Whether `self.status -> next` is permitted
    pub fn is_valid_transition(&self, next: DecisionStatus) -> bool {
        self.status.is_valid_transition(next)
    }

    /// Statuses this decision may move to next
    pub fn valid_transitions(&self) -> &'static [DecisionStatus] {
        self.status.valid_transitions()
    }

    /// Move to `next` at the current time
    pub fn transition_to(
        &self,
        next: DecisionStatus,
        actor: Option<&str>,
    ) -> Result<Decision, ValidationError> {
        self.transition_at(next, actor, Timestamp::now())
    }

    /// Move to `next`, stamping `at` and `actor` into the matching fields
    pub fn transition_at(
        &self,
        next: DecisionStatus,
        actor: Option<&str>,
        at: Timestamp,
    ) -> Result<Decision, ValidationError> {
        if !self.is_valid_transition(next) {
            return Err(ValidationError::new(
                "status",
                ValidationCode::InvalidTransition,
                format!("Invalid transition from {} to {}", self.status, next),
                format_allowed(self.status),
                next.as_str(),
            ));
        }

        let mut updated = self.clone();
        updated.status = next;
        updated.updated_at = at;
        match next {
            DecisionStatus::Approved => {
                updated.approved_by = actor.map(str::to_string);
                updated.approved_at = Some(at);
            }
            DecisionStatus::Rejected => {
                updated.rejected_by = actor.map(str::to_string);
                updated.rejected_at = Some(at);
            }
            DecisionStatus::Executed => {
                updated.executed_at = Some(at);
            }
            DecisionStatus::Failed => {
                updated.outcome = Some(DecisionOutcome::Failure);
            }
            DecisionStatus::Proposed | DecisionStatus::RolledBack => {}
        }
        Ok(updated)
    }

    /// Copy with a rejection rationale
    pub fn with_rejection_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rejection_rationale = Some(rationale.into());
        self
    }

    /// Copy with an execution outcome
    pub fn with_outcome(mut self, outcome: DecisionOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Copy with new policy references
    pub fn with_policy_refs(mut self, policy_refs: Vec<PolicyRef>) -> Self {
        self.policy_refs = policy_refs;
        self
    }

    /// Whether a human must approve this decision
    pub fn requires_approval(&self) -> bool {
        matches!(self.risk_level, RiskLevel::High | RiskLevel::Critical)
    }

    /// Whether any referenced policy is violated
    pub fn has_policy_violations(&self) -> bool {
        self.policy_refs.iter().any(PolicyRef::is_violated)
    }

    /// Policy references with violated requirements
    pub fn policy_violations(&self) -> Vec<&PolicyRef> {
        self.policy_refs.iter().filter(|r| r.is_violated()).collect()
    }

    /// Whether the decision reached a terminal status
    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }
}

fn format_allowed(status: DecisionStatus) -> String {
    let allowed = status.valid_transitions();
    if allowed.is_empty() {
        return "none (terminal)".to_string();
    }
    allowed
        .iter()
        .map(DecisionStatus::as_str)
        .collect::<Vec<_>>()
        .join("|")
}
