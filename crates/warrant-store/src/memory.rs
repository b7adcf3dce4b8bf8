//! In-memory store

use crate::StoreError;
use semver::Version;
use std::collections::{BTreeMap, HashMap, HashSet};
use warrant_domain::traits::{
    DecisionQuery, DecisionStore, PolicyQuery, PolicyStore, ProvenanceStore, Store,
};
use warrant_domain::{
    Decision, DecisionId, DecisionStatus, Policy, PolicyId, ProvenanceEntry, ProvenanceId,
    ScannedEntry,
};

#[derive(Debug, Clone, Default)]
struct Collections {
    decisions: HashMap<DecisionId, Decision>,
    entries: Vec<ProvenanceEntry>,
    claimed_hashes: HashSet<String>,
    policies: BTreeMap<(PolicyId, Version), Policy>,
}

/// Process-local store
///
/// Transactions snapshot every collection up front and restore the snapshot
/// when the closure fails. Used by tests and by the simulator, which must
/// never touch durable state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Collections,
    in_transaction: bool,
    writes: u64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful write operations since creation
    ///
    /// Writes rolled back by a failed transaction are still counted.
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Number of stored decisions
    pub fn decision_count(&self) -> usize {
        self.data.decisions.len()
    }
}

impl Store for MemoryStore {
    type Error = StoreError;

    fn transaction<T, E, F>(&mut self, f: F) -> Result<Result<T, E>, Self::Error>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        if self.in_transaction {
            return Ok(f(self));
        }

        let snapshot = self.data.clone();
        self.in_transaction = true;
        let result = f(self);
        self.in_transaction = false;

        if result.is_err() {
            self.data = snapshot;
        }
        Ok(result)
    }
}

impl DecisionStore for MemoryStore {
    fn insert_decision(&mut self, decision: &Decision) -> Result<(), Self::Error> {
        if self.data.decisions.contains_key(&decision.id) {
            return Err(StoreError::Duplicate(format!("decision {}", decision.id)));
        }
        self.data.decisions.insert(decision.id, decision.clone());
        self.writes += 1;
        Ok(())
    }

    fn update_decision(
        &mut self,
        decision: &Decision,
        expected_status: DecisionStatus,
    ) -> Result<(), Self::Error> {
        let stored = self
            .data
            .decisions
            .get_mut(&decision.id)
            .ok_or_else(|| StoreError::NotFound(format!("decision {}", decision.id)))?;

        if stored.status != expected_status {
            return Err(StoreError::Conflict {
                id: decision.id.to_string(),
                expected: expected_status.as_str().to_string(),
                actual: stored.status.as_str().to_string(),
            });
        }

        *stored = decision.clone();
        self.writes += 1;
        Ok(())
    }

    fn get_decision(&self, id: DecisionId) -> Result<Option<Decision>, Self::Error> {
        Ok(self.data.decisions.get(&id).cloned())
    }

    fn query_decisions(&self, query: &DecisionQuery) -> Result<Vec<Decision>, Self::Error> {
        let mut matching: Vec<Decision> = self
            .data
            .decisions
            .values()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.proposed_at.cmp(&b.proposed_at).then_with(|| a.id.cmp(&b.id)));

        if let Some(limit) = query.limit {
            let skip = matching.len().saturating_sub(limit);
            matching.drain(..skip);
        }
        Ok(matching)
    }

    fn count_decisions(&self, query: &DecisionQuery) -> Result<usize, Self::Error> {
        Ok(self.data.decisions.values().filter(|d| query.matches(d)).count())
    }
}

impl ProvenanceStore for MemoryStore {
    fn append_entry(&mut self, entry: &ProvenanceEntry) -> Result<u64, Self::Error> {
        if self.data.claimed_hashes.contains(&entry.previous_hash) {
            return Err(StoreError::ChainConflict(entry.previous_hash.clone()));
        }
        if self.data.entries.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::Duplicate(format!("provenance entry {}", entry.id)));
        }

        self.data.claimed_hashes.insert(entry.previous_hash.clone());
        self.data.entries.push(entry.clone());
        self.writes += 1;
        Ok(self.data.entries.len() as u64)
    }

    fn get_entry(&self, id: ProvenanceId) -> Result<Option<ProvenanceEntry>, Self::Error> {
        Ok(self.data.entries.iter().find(|e| e.id == id).cloned())
    }

    fn last_entry(&self) -> Result<Option<ProvenanceEntry>, Self::Error> {
        Ok(self.data.entries.last().cloned())
    }

    fn scan_entries(&self, offset: u64, limit: usize) -> Result<Vec<ScannedEntry>, Self::Error> {
        Ok(self
            .data
            .entries
            .iter()
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .map(ScannedEntry::from)
            .collect())
    }

    fn count_entries(&self) -> Result<u64, Self::Error> {
        Ok(self.data.entries.len() as u64)
    }
}

impl PolicyStore for MemoryStore {
    fn upsert_policy(&mut self, policy: &Policy) -> Result<(), Self::Error> {
        self.data
            .policies
            .insert((policy.id.clone(), policy.version.clone()), policy.clone());
        self.writes += 1;
        Ok(())
    }

    fn get_policy(&self, id: &PolicyId, version: &Version) -> Result<Option<Policy>, Self::Error> {
        Ok(self.data.policies.get(&(id.clone(), version.clone())).cloned())
    }

    fn query_policies(&self, query: &PolicyQuery) -> Result<Vec<Policy>, Self::Error> {
        Ok(self
            .data
            .policies
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect())
    }
}
