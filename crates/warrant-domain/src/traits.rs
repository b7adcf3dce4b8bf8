//! Storage boundaries
//!
//! These traits define the boundary between the governance core and the
//! persistence layer. Implementations live in `warrant-store`.

use crate::{
    Decision, DecisionId, DecisionStatus, Policy, PolicyId, PolicyStatus, ProvenanceEntry,
    ProvenanceId, ScannedEntry,
};
use semver::Version;

/// Shared error type and transaction primitive for the collection stores
pub trait Store {
    /// Error type for store operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run `f` atomically
    ///
    /// The outer `Result` reports a failure to begin or commit the
    /// transaction. The inner `Result` is the closure's own; when it is an
    /// `Err`, every write made inside `f` is rolled back.
    fn transaction<T, E, F>(&mut self, f: F) -> Result<Result<T, E>, Self::Error>
    where
        F: FnOnce(&mut Self) -> Result<T, E>;
}

/// The "decisions" collection
pub trait DecisionStore: Store {
    /// Insert a new decision; fails if the id exists
    fn insert_decision(&mut self, decision: &Decision) -> Result<(), Self::Error>;

    /// Replace a stored decision if its stored status is still `expected_status`
    ///
    /// A mismatch means another writer moved the decision first and must be
    /// reported as a conflict.
    fn update_decision(
        &mut self,
        decision: &Decision,
        expected_status: DecisionStatus,
    ) -> Result<(), Self::Error>;

    /// Get a decision by id
    fn get_decision(&self, id: DecisionId) -> Result<Option<Decision>, Self::Error>;

    /// Decisions matching `query`, oldest proposal first
    fn query_decisions(&self, query: &DecisionQuery) -> Result<Vec<Decision>, Self::Error>;

    /// Number of decisions matching `query`, ignoring its limit
    fn count_decisions(&self, query: &DecisionQuery) -> Result<usize, Self::Error>;
}

/// The "provenance" collection: an ordered append log
pub trait ProvenanceStore: Store {
    /// Append an entry at the end of the log and return its sequence number
    ///
    /// Implementations must refuse an entry whose `previous_hash` is already
    /// claimed by another entry.
    fn append_entry(&mut self, entry: &ProvenanceEntry) -> Result<u64, Self::Error>;

    /// Get an entry by id
    fn get_entry(&self, id: ProvenanceId) -> Result<Option<ProvenanceEntry>, Self::Error>;

    /// Most recently appended entry
    fn last_entry(&self) -> Result<Option<ProvenanceEntry>, Self::Error>;

    /// Up to `limit` rows starting at position `offset`, in insertion order
    ///
    /// A row whose fields no longer decode is returned as
    /// [`ScannedEntry::Undecodable`]; errors are reserved for failures of
    /// the store itself.
    fn scan_entries(&self, offset: u64, limit: usize) -> Result<Vec<ScannedEntry>, Self::Error>;

    /// Number of entries in the log
    fn count_entries(&self) -> Result<u64, Self::Error>;
}

/// The "policies" collection
pub trait PolicyStore: Store {
    /// Insert or replace the policy with the same id and version
    fn upsert_policy(&mut self, policy: &Policy) -> Result<(), Self::Error>;

    /// Get one version of a policy
    fn get_policy(&self, id: &PolicyId, version: &Version) -> Result<Option<Policy>, Self::Error>;

    /// Policies matching `query`
    fn query_policies(&self, query: &PolicyQuery) -> Result<Vec<Policy>, Self::Error>;
}

/// Filter for [`DecisionStore::query_decisions`]
#[derive(Debug, Clone, Default)]
pub struct DecisionQuery {
    /// Restrict to these statuses (empty means any)
    pub statuses: Vec<DecisionStatus>,

    /// Restrict to a decision type
    pub decision_type: Option<String>,

    /// Restrict to a proposer
    pub proposed_by: Option<String>,

    /// Newest results only, when set
    pub limit: Option<usize>,
}

impl DecisionQuery {
    /// Whether `decision` satisfies the filter (limit aside)
    pub fn matches(&self, decision: &Decision) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&decision.status))
            && self
                .decision_type
                .as_ref()
                .map_or(true, |t| &decision.decision_type == t)
            && self
                .proposed_by
                .as_ref()
                .map_or(true, |p| &decision.proposed_by == p)
    }
}

/// Filter for [`PolicyStore::query_policies`]
#[derive(Debug, Clone, Default)]
pub struct PolicyQuery {
    /// Restrict to one policy id
    pub id: Option<PolicyId>,

    /// Restrict to a status
    pub status: Option<PolicyStatus>,
}

impl PolicyQuery {
    /// Whether `policy` satisfies the filter
    pub fn matches(&self, policy: &Policy) -> bool {
        self.id.as_ref().map_or(true, |id| &policy.id == id)
            && self.status.map_or(true, |s| policy.status == s)
    }
}
