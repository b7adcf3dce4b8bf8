//! Warrant Provenance Ledger
//!
//! Append-only, hash-linked audit log of everything that happens to a
//! decision.
//!
//! Each entry stores the SHA-256 digest of its own fields plus the digest of
//! the entry recorded before it. Editing any stored field breaks the entry's
//! own hash; inserting, dropping or reordering entries breaks a link.
//!
//! # Examples
//!
//! ```
//! use warrant_domain::{NewProvenanceEntry, SourceType};
//! use warrant_ledger::ProvenanceLedger;
//! use warrant_store::MemoryStore;
//!
//! let ledger = ProvenanceLedger::new();
//! let mut store = MemoryStore::new();
//! ledger
//!     .record(&mut store, NewProvenanceEntry::new(SourceType::Agent, "agent:planner", "propose"))
//!     .unwrap();
//!
//! let report = ledger.verify(&store).unwrap();
//! assert!(report.valid);
//! ```

#![warn(missing_docs)]

mod chain;
mod error;
mod ledger;

pub use chain::{compute_hash, verify_entries, ChainVerification, ChainWalker};
pub use error::{LedgerError, Result};
pub use ledger::{ProvenanceLedger, DEFAULT_PAGE_SIZE};
