//! Hash computation and chain verification

use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use warrant_domain::{ProvenanceEntry, ScannedEntry, GENESIS_HASH};

/// Compute the digest an entry must carry
///
/// The hashed fields are serialized as one JSON object with sorted keys and
/// the previous hash is appended verbatim, so the same inputs always produce
/// the same digest regardless of how metadata maps were built.
pub fn compute_hash(entry: &ProvenanceEntry) -> String {
    let canonical = json!({
        "sourceType": entry.source_type.as_str(),
        "sourceId": entry.source_id,
        "action": entry.action,
        "timestamp": entry.timestamp.as_millis(),
        "inputRefs": entry.input_refs,
        "outputRefs": entry.output_refs,
        "metadata": entry.metadata,
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hasher.update(entry.previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of a full chain walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    /// True iff no broken links and no invalid hashes were found
    pub valid: bool,

    /// Number of entries examined
    pub entries_verified: u64,

    /// Entries whose previous hash does not name their predecessor
    pub broken_links: u64,

    /// Entries whose stored hash does not match a recomputation
    pub invalid_hashes: u64,

    /// One message per finding, in ledger order
    pub errors: Vec<String>,
}

impl Default for ChainVerification {
    fn default() -> Self {
        Self {
            valid: true,
            entries_verified: 0,
            broken_links: 0,
            invalid_hashes: 0,
            errors: Vec::new(),
        }
    }
}

/// Incremental verifier fed entries in insertion order
///
/// Lets the ledger verify page by page without holding the whole log.
#[derive(Debug, Default)]
pub struct ChainWalker {
    predecessor: Option<String>,
    seen: HashSet<String>,
    report: ChainVerification,
}

impl ChainWalker {
    /// Start a walk at the genesis position
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the next entry
    pub fn check(&mut self, entry: &ProvenanceEntry) {
        let computed = compute_hash(entry);
        if computed != entry.hash {
            self.report.invalid_hashes += 1;
            self.report.errors.push(format!(
                "Entry {} has invalid hash (stored: {}, computed: {})",
                entry.id, entry.hash, computed
            ));
        }
        self.link(&entry.id.to_string(), &entry.hash, &entry.previous_hash);
    }

    /// Check the next row, whether or not it decoded
    ///
    /// An undecodable row cannot have its hash recomputed and counts as an
    /// invalid hash; its stored link is still followed.
    pub fn check_scanned(&mut self, scanned: &ScannedEntry) {
        match scanned {
            ScannedEntry::Entry(entry) => self.check(entry),
            ScannedEntry::Undecodable(raw) => {
                self.report.invalid_hashes += 1;
                self.report.errors.push(format!(
                    "Entry {} cannot be decoded ({}); stored hash {} cannot be recomputed",
                    raw.id, raw.reason, raw.hash
                ));
                self.link(&raw.id, &raw.hash, &raw.previous_hash);
            }
        }
    }

    fn link(&mut self, id: &str, hash: &str, previous_hash: &str) {
        let expected = self.predecessor.as_deref().unwrap_or(GENESIS_HASH);
        if previous_hash != expected {
            self.report.broken_links += 1;
            let message = if self.seen.contains(previous_hash) {
                format!(
                    "Entry {} links to an earlier entry {} instead of its predecessor",
                    id, previous_hash
                )
            } else {
                format!(
                    "Entry {} has broken chain link (expected prev: {}, got: {})",
                    id, expected, previous_hash
                )
            };
            self.report.errors.push(message);
        }

        // Links are checked against what was stored, not what was recomputed
        self.seen.insert(hash.to_string());
        self.predecessor = Some(hash.to_string());
        self.report.entries_verified += 1;
    }

    /// Finish the walk
    pub fn finish(mut self) -> ChainVerification {
        self.report.valid = self.report.broken_links == 0 && self.report.invalid_hashes == 0;
        self.report
    }
}

/// Verify an in-memory slice of entries in order
pub fn verify_entries(entries: &[ProvenanceEntry]) -> ChainVerification {
    let mut walker = ChainWalker::new();
    for entry in entries {
        walker.check(entry);
    }
    walker.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use warrant_domain::{ProvenanceId, SourceType, Timestamp, UndecodableEntry};

    fn chained(previous: &str, action: &str) -> ProvenanceEntry {
        let mut entry = ProvenanceEntry {
            id: ProvenanceId::new(),
            source_type: SourceType::Agent,
            source_id: "agent:planner".into(),
            action: action.into(),
            timestamp: Timestamp::from_millis(42),
            input_refs: vec![],
            output_refs: vec!["decision:1".into()],
            metadata: BTreeMap::new(),
            hash: String::new(),
            previous_hash: previous.into(),
        };
        entry.hash = compute_hash(&entry);
        entry
    }

    fn chain(n: usize) -> Vec<ProvenanceEntry> {
        let mut entries: Vec<ProvenanceEntry> = Vec::new();
        for i in 0..n {
            let previous = entries
                .last()
                .map(|e| e.hash.clone())
                .unwrap_or_else(|| GENESIS_HASH.to_string());
            entries.push(chained(&previous, &format!("step-{}", i)));
        }
        entries
    }

    #[test]
    fn test_hash_is_deterministic_and_hex() {
        let entry = chained(GENESIS_HASH, "propose");
        assert_eq!(compute_hash(&entry), entry.hash);
        assert_eq!(entry.hash.len(), 64);
        assert!(entry.hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_ignores_id() {
        let a = chained(GENESIS_HASH, "propose");
        let mut b = a.clone();
        b.id = ProvenanceId::new();
        assert_eq!(compute_hash(&a), compute_hash(&b));
    }

    #[test]
    fn test_hash_covers_previous_hash() {
        let a = chained(GENESIS_HASH, "propose");
        let mut b = a.clone();
        b.previous_hash = "f".repeat(64);
        assert_ne!(compute_hash(&a), compute_hash(&b));
    }

    #[test]
    fn test_metadata_insertion_order_is_irrelevant() {
        let mut a = chained(GENESIS_HASH, "propose");
        a.metadata.insert("b".into(), json!(2));
        a.metadata.insert("a".into(), json!({"z": 1, "y": 2}));
        let mut b = chained(GENESIS_HASH, "propose");
        b.metadata.insert("a".into(), json!({"y": 2, "z": 1}));
        b.metadata.insert("b".into(), json!(2));
        assert_eq!(compute_hash(&a), compute_hash(&b));
    }

    #[test]
    fn test_empty_chain_is_valid() {
        let report = verify_entries(&[]);
        assert!(report.valid);
        assert_eq!(report.entries_verified, 0);
    }

    #[test]
    fn test_intact_chain() {
        let report = verify_entries(&chain(5));
        assert!(report.valid);
        assert_eq!(report.entries_verified, 5);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_edited_field_is_invalid_hash() {
        let mut entries = chain(3);
        entries[1].action = "approve".into();

        let report = verify_entries(&entries);
        assert!(!report.valid);
        assert_eq!(report.invalid_hashes, 1);
        assert_eq!(report.broken_links, 0);
        assert_eq!(report.entries_verified, 3);
    }

    #[test]
    fn test_unknown_previous_hash_is_broken_link() {
        let mut entries = chain(3);
        entries[2].previous_hash = "0".repeat(63) + "1";

        let report = verify_entries(&entries);
        assert!(!report.valid);
        assert!(report.broken_links >= 1);
        assert!(report.errors[0].contains("broken chain link"));
    }

    #[test]
    fn test_first_entry_must_carry_genesis() {
        let mut entries = chain(1);
        entries[0].previous_hash = "a".repeat(64);
        entries[0].hash = compute_hash(&entries[0]);

        let report = verify_entries(&entries);
        assert_eq!(report.broken_links, 1);
        assert_eq!(report.invalid_hashes, 0);
    }

    #[test]
    fn test_link_to_earlier_entry_is_reported_as_fork() {
        let mut entries = chain(3);
        entries[2].previous_hash = entries[0].hash.clone();
        entries[2].hash = compute_hash(&entries[2]);

        let report = verify_entries(&entries);
        assert_eq!(report.broken_links, 1);
        assert!(report.errors[0].contains("earlier entry"));
    }

    #[test]
    fn test_undecodable_row_is_invalid_hash_and_keeps_its_link() {
        let entries = chain(3);
        let raw = UndecodableEntry {
            id: entries[1].id.to_string(),
            hash: entries[1].hash.clone(),
            previous_hash: entries[1].previous_hash.clone(),
            reason: "Unknown source type: robot".into(),
        };

        let mut walker = ChainWalker::new();
        walker.check_scanned(&ScannedEntry::from(entries[0].clone()));
        walker.check_scanned(&ScannedEntry::Undecodable(raw));
        walker.check_scanned(&ScannedEntry::from(entries[2].clone()));
        let report = walker.finish();

        assert!(!report.valid);
        assert_eq!(report.invalid_hashes, 1);
        assert_eq!(report.broken_links, 0);
        assert_eq!(report.entries_verified, 3);
        assert!(report.errors[0].contains("robot"));
    }

    #[test]
    fn test_scan_does_not_stop_at_first_finding() {
        let mut entries = chain(4);
        entries[0].source_id = "agent:mallory".into();
        entries[3].source_id = "agent:mallory".into();

        let report = verify_entries(&entries);
        assert_eq!(report.invalid_hashes, 2);
        assert_eq!(report.entries_verified, 4);
    }
}
