//! The provenance ledger service

use crate::chain::{compute_hash, ChainVerification, ChainWalker};
use crate::error::{LedgerError, Result};
use tracing::{debug, info, warn};
use warrant_domain::traits::ProvenanceStore;
use warrant_domain::{
    NewProvenanceEntry, ProvenanceEntry, ProvenanceId, ScannedEntry, Timestamp, GENESIS_HASH,
};

/// Default number of entries read per page during scans
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Append-only, hash-linked audit log over a [`ProvenanceStore`]
///
/// The ledger holds no entries itself; every call is given the store to act
/// on, so the same ledger can append inside a caller's transaction.
#[derive(Debug, Clone)]
pub struct ProvenanceLedger {
    page_size: usize,
}

impl Default for ProvenanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvenanceLedger {
    /// Create a ledger with the default scan page size
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Use a different page size for scans (minimum 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Chain `entry` after the current head and persist it
    pub fn record<S: ProvenanceStore>(
        &self,
        store: &mut S,
        entry: NewProvenanceEntry,
    ) -> Result<ProvenanceEntry> {
        self.record_at(store, entry, Timestamp::now())
    }

    /// Like [`record`](Self::record) with an explicit timestamp
    pub fn record_at<S: ProvenanceStore>(
        &self,
        store: &mut S,
        entry: NewProvenanceEntry,
        at: Timestamp,
    ) -> Result<ProvenanceEntry> {
        // Reading the head and appending must not interleave with another writer
        let (seq, chained) = store
            .transaction(|s| {
                let previous_hash = s
                    .last_entry()?
                    .map(|head| head.hash)
                    .unwrap_or_else(|| GENESIS_HASH.to_string());

                let mut chained = ProvenanceEntry {
                    id: ProvenanceId::new(),
                    source_type: entry.source_type,
                    source_id: entry.source_id,
                    action: entry.action,
                    timestamp: at,
                    input_refs: entry.input_refs,
                    output_refs: entry.output_refs,
                    metadata: entry.metadata,
                    hash: String::new(),
                    previous_hash,
                };
                chained.hash = compute_hash(&chained);

                let seq = s.append_entry(&chained)?;
                Ok::<_, S::Error>((seq, chained))
            })
            .map_err(LedgerError::store)?
            .map_err(LedgerError::store)?;

        debug!(
            seq,
            id = %chained.id,
            action = %chained.action,
            source_id = %chained.source_id,
            "Recorded provenance entry"
        );
        Ok(chained)
    }

    /// Look up one entry
    pub fn get_by_id<S: ProvenanceStore>(
        &self,
        store: &S,
        id: ProvenanceId,
    ) -> Result<Option<ProvenanceEntry>> {
        store.get_entry(id).map_err(LedgerError::store)
    }

    /// Most recently recorded entry
    pub fn head<S: ProvenanceStore>(&self, store: &S) -> Result<Option<ProvenanceEntry>> {
        store.last_entry().map_err(LedgerError::store)
    }

    /// Number of recorded entries
    pub fn entry_count<S: ProvenanceStore>(&self, store: &S) -> Result<u64> {
        store.count_entries().map_err(LedgerError::store)
    }

    /// Every entry naming `reference` as an input or output, in ledger order
    pub fn entries_for<S: ProvenanceStore>(
        &self,
        store: &S,
        reference: &str,
    ) -> Result<Vec<ProvenanceEntry>> {
        let mut found = Vec::new();
        self.scan(store, |scanned| match scanned {
            ScannedEntry::Entry(entry) => {
                if entry.references(reference) {
                    found.push(entry.clone());
                }
            }
            ScannedEntry::Undecodable(raw) => {
                warn!(id = %raw.id, reason = %raw.reason, "Skipping undecodable provenance entry");
            }
        })?;
        Ok(found)
    }

    /// Walk the whole ledger in insertion order and check every hash and link
    ///
    /// Findings never stop the walk, including rows that no longer decode.
    /// A store failure does, and is returned as an error rather than as an
    /// invalid chain.
    pub fn verify<S: ProvenanceStore>(&self, store: &S) -> Result<ChainVerification> {
        let mut walker = ChainWalker::new();
        self.scan(store, |scanned| walker.check_scanned(scanned))?;
        let report = walker.finish();

        if report.valid {
            info!(entries = report.entries_verified, "Ledger verified");
        } else {
            warn!(
                entries = report.entries_verified,
                broken_links = report.broken_links,
                invalid_hashes = report.invalid_hashes,
                "Ledger integrity check failed"
            );
        }
        Ok(report)
    }

    fn scan<S, F>(&self, store: &S, mut visit: F) -> Result<()>
    where
        S: ProvenanceStore,
        F: FnMut(&ScannedEntry),
    {
        let mut offset = 0u64;
        loop {
            let page = store
                .scan_entries(offset, self.page_size)
                .map_err(LedgerError::store)?;
            for entry in &page {
                visit(entry);
            }
            if page.len() < self.page_size {
                return Ok(());
            }
            offset += page.len() as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use warrant_domain::traits::Store;
    use warrant_domain::SourceType;

    #[derive(Debug)]
    struct VecStoreError(String);

    impl fmt::Display for VecStoreError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for VecStoreError {}

    /// Minimal store with directly editable entries
    #[derive(Default)]
    struct VecStore {
        entries: Vec<ProvenanceEntry>,
        fail_scans: bool,
    }

    impl Store for VecStore {
        type Error = VecStoreError;

        fn transaction<T, E, F>(&mut self, f: F) -> std::result::Result<std::result::Result<T, E>, Self::Error>
        where
            F: FnOnce(&mut Self) -> std::result::Result<T, E>,
        {
            Ok(f(self))
        }
    }

    impl ProvenanceStore for VecStore {
        fn append_entry(&mut self, entry: &ProvenanceEntry) -> std::result::Result<u64, Self::Error> {
            if self.entries.iter().any(|e| e.previous_hash == entry.previous_hash) {
                return Err(VecStoreError("fork".into()));
            }
            self.entries.push(entry.clone());
            Ok(self.entries.len() as u64)
        }

        fn get_entry(&self, id: ProvenanceId) -> std::result::Result<Option<ProvenanceEntry>, Self::Error> {
            Ok(self.entries.iter().find(|e| e.id == id).cloned())
        }

        fn last_entry(&self) -> std::result::Result<Option<ProvenanceEntry>, Self::Error> {
            Ok(self.entries.last().cloned())
        }

        fn scan_entries(
            &self,
            offset: u64,
            limit: usize,
        ) -> std::result::Result<Vec<ScannedEntry>, Self::Error> {
            if self.fail_scans {
                return Err(VecStoreError("disk on fire".into()));
            }
            Ok(self
                .entries
                .iter()
                .skip(offset as usize)
                .take(limit)
                .cloned()
                .map(ScannedEntry::from)
                .collect())
        }

        fn count_entries(&self) -> std::result::Result<u64, Self::Error> {
            Ok(self.entries.len() as u64)
        }
    }

    fn record_n(ledger: &ProvenanceLedger, store: &mut VecStore, n: usize) {
        for i in 0..n {
            ledger
                .record(
                    store,
                    NewProvenanceEntry::new(SourceType::System, "system", format!("step-{}", i))
                        .with_output(format!("decision:{}", i % 2)),
                )
                .unwrap();
        }
    }

    #[test]
    fn test_first_record_links_to_genesis() {
        let ledger = ProvenanceLedger::new();
        let mut store = VecStore::default();

        let entry = ledger
            .record(&mut store, NewProvenanceEntry::new(SourceType::Agent, "agent:a", "propose"))
            .unwrap();

        assert!(entry.is_genesis());
        assert_eq!(entry.hash, compute_hash(&entry));
    }

    #[test]
    fn test_records_chain_to_previous() {
        let ledger = ProvenanceLedger::new();
        let mut store = VecStore::default();
        record_n(&ledger, &mut store, 3);

        assert_eq!(store.entries[1].previous_hash, store.entries[0].hash);
        assert_eq!(store.entries[2].previous_hash, store.entries[1].hash);
    }

    #[test]
    fn test_verify_pages_through_everything() {
        let ledger = ProvenanceLedger::new().with_page_size(2);
        let mut store = VecStore::default();
        record_n(&ledger, &mut store, 5);

        let report = ledger.verify(&store).unwrap();
        assert!(report.valid);
        assert_eq!(report.entries_verified, 5);
    }

    #[test]
    fn test_tampering_is_found() {
        let ledger = ProvenanceLedger::new();
        let mut store = VecStore::default();
        record_n(&ledger, &mut store, 4);

        store.entries[1].source_id = "user:mallory".into();
        store.entries[3].previous_hash = "b".repeat(64);

        let report = ledger.verify(&store).unwrap();
        assert!(!report.valid);
        assert!(report.invalid_hashes >= 1);
        assert!(report.broken_links >= 1);
        assert_eq!(report.entries_verified, 4);
    }

    #[test]
    fn test_storage_fault_is_an_error_not_a_finding() {
        let ledger = ProvenanceLedger::new();
        let mut store = VecStore::default();
        record_n(&ledger, &mut store, 2);
        store.fail_scans = true;

        let err = ledger.verify(&store).unwrap_err();
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_entries_for_and_head() {
        let ledger = ProvenanceLedger::new().with_page_size(1);
        let mut store = VecStore::default();
        assert!(ledger.head(&store).unwrap().is_none());
        record_n(&ledger, &mut store, 5);

        let for_zero = ledger.entries_for(&store, "decision:0").unwrap();
        let actions: Vec<&str> = for_zero.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["step-0", "step-2", "step-4"]);

        let head = ledger.head(&store).unwrap().unwrap();
        assert_eq!(head.action, "step-4");
        assert_eq!(ledger.entry_count(&store).unwrap(), 5);
        assert_eq!(ledger.get_by_id(&store, head.id).unwrap(), Some(head));
    }
}
