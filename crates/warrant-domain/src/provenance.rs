//! Provenance ledger entries

use crate::ids::{ProvenanceId, Timestamp};
use crate::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// `previous_hash` of the first entry in a ledger
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Kind of actor that caused a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// The governance system itself
    System,
    /// An AI agent
    Agent,
    /// A human operator
    Human,
    /// An integration outside the system
    External,
}

impl SourceType {
    /// Wire name of the source type
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::System => "system",
            SourceType::Agent => "agent",
            SourceType::Human => "human",
            SourceType::External => "external",
        }
    }

    /// Parse a source type from its wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "system" => Some(SourceType::System),
            "agent" => Some(SourceType::Agent),
            "human" => Some(SourceType::Human),
            "external" => Some(SourceType::External),
            _ => None,
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            ValidationError::invalid_value("sourceType", "system|agent|human|external", s)
        })
    }
}

/// An entry as submitted to the ledger, before it is chained
#[derive(Debug, Clone, PartialEq)]
pub struct NewProvenanceEntry {
    /// Kind of actor
    pub source_type: SourceType,
    /// Actor identifier (e.g. "agent:planner", "user:alice")
    pub source_id: String,
    /// Verb being recorded (e.g. "propose", "approve")
    pub action: String,
    /// Records consumed by the action
    pub input_refs: Vec<String>,
    /// Records produced or changed by the action
    pub output_refs: Vec<String>,
    /// Free-form structured detail
    pub metadata: BTreeMap<String, Value>,
}

impl NewProvenanceEntry {
    /// Create an entry with no refs or metadata
    pub fn new(source_type: SourceType, source_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            source_type,
            source_id: source_id.into(),
            action: action.into(),
            input_refs: Vec::new(),
            output_refs: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add an input reference
    pub fn with_input(mut self, reference: impl Into<String>) -> Self {
        self.input_refs.push(reference.into());
        self
    }

    /// Add an output reference
    pub fn with_output(mut self, reference: impl Into<String>) -> Self {
        self.output_refs.push(reference.into());
        self
    }

    /// Attach a metadata value
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A chained, immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceEntry {
    /// Unique identifier
    pub id: ProvenanceId,
    /// Kind of actor
    pub source_type: SourceType,
    /// Actor identifier
    pub source_id: String,
    /// Verb being recorded
    pub action: String,
    /// When the entry was recorded
    pub timestamp: Timestamp,
    /// Records consumed by the action
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_refs: Vec<String>,
    /// Records produced or changed by the action
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_refs: Vec<String>,
    /// Free-form structured detail
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Digest of this entry's fields and `previous_hash`
    pub hash: String,
    /// Hash of the preceding entry, or [`GENESIS_HASH`]
    pub previous_hash: String,
}

impl ProvenanceEntry {
    /// Whether this entry mentions `reference` as an input or output
    pub fn references(&self, reference: &str) -> bool {
        self.input_refs.iter().any(|r| r == reference)
            || self.output_refs.iter().any(|r| r == reference)
    }

    /// Whether this is the first entry of a ledger
    pub fn is_genesis(&self) -> bool {
        self.previous_hash == GENESIS_HASH
    }
}

/// A stored ledger row whose hashed fields no longer decode
///
/// Only the columns needed to follow the chain are kept, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecodableEntry {
    /// Stored identifier, possibly not a valid id
    pub id: String,
    /// Stored digest
    pub hash: String,
    /// Stored link to the preceding entry
    pub previous_hash: String,
    /// Why the row could not be decoded
    pub reason: String,
}

/// One row returned by a ledger scan
#[derive(Debug, Clone, PartialEq)]
pub enum ScannedEntry {
    /// A row that decoded into an entry
    Entry(ProvenanceEntry),
    /// A row that did not
    Undecodable(UndecodableEntry),
}

impl ScannedEntry {
    /// Stored digest of the row
    pub fn hash(&self) -> &str {
        match self {
            ScannedEntry::Entry(entry) => &entry.hash,
            ScannedEntry::Undecodable(raw) => &raw.hash,
        }
    }

    /// Stored link of the row
    pub fn previous_hash(&self) -> &str {
        match self {
            ScannedEntry::Entry(entry) => &entry.previous_hash,
            ScannedEntry::Undecodable(raw) => &raw.previous_hash,
        }
    }

    /// The decoded entry, if the row decoded
    pub fn entry(&self) -> Option<&ProvenanceEntry> {
        match self {
            ScannedEntry::Entry(entry) => Some(entry),
            ScannedEntry::Undecodable(_) => None,
        }
    }
}

impl From<ProvenanceEntry> for ScannedEntry {
    fn from(entry: ProvenanceEntry) -> Self {
        ScannedEntry::Entry(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let entry = NewProvenanceEntry::new(SourceType::Agent, "agent:planner", "propose")
            .with_input("claim:1")
            .with_output("decision:1")
            .with_metadata("riskLevel", "high");

        assert_eq!(entry.input_refs, vec!["claim:1"]);
        assert_eq!(entry.output_refs, vec!["decision:1"]);
        assert_eq!(entry.metadata.get("riskLevel"), Some(&Value::from("high")));
    }

    #[test]
    fn test_source_type_parse() {
        assert_eq!(SourceType::parse("Human"), Some(SourceType::Human));
        assert!(SourceType::parse("robot").is_none());
        let err = "robot".parse::<SourceType>().unwrap_err();
        assert_eq!(err.field, "sourceType");
    }

    #[test]
    fn test_scanned_entry_exposes_stored_links() {
        let raw = ScannedEntry::Undecodable(UndecodableEntry {
            id: "x".into(),
            hash: "h2".into(),
            previous_hash: "h1".into(),
            reason: "metadata is not valid JSON".into(),
        });
        assert_eq!(raw.hash(), "h2");
        assert_eq!(raw.previous_hash(), "h1");
        assert!(raw.entry().is_none());
    }

    #[test]
    fn test_genesis_sentinel_is_hash_sized() {
        assert_eq!(GENESIS_HASH.len(), 64);
    }
}
