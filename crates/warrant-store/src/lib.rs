//! Warrant Storage Layer
//!
//! Implements the collection stores from `warrant_domain::traits`.
//!
//! # Architecture
//!
//! - [`SqliteStore`]: durable storage in a single SQLite file, with the
//!   ledger kept as an ordered append log keyed by insertion sequence
//! - [`MemoryStore`]: process-local storage for tests, simulations and
//!   ephemeral runs
//!
//! Both stores roll back every write made inside a failed
//! [`Store::transaction`](warrant_domain::traits::Store::transaction).
//!
//! # Examples
//!
//! ```no_run
//! use warrant_store::SqliteStore;
//!
//! let store = SqliteStore::new(":memory:").unwrap();
//! // Store is now ready for decision, ledger and policy operations
//! ```

#![warn(missing_docs)]

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored body could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A record with the same key already exists
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Optimistic update lost a race
    #[error("Conflict on {id}: expected status {expected}, found {actual}")]
    Conflict {
        /// Record id
        id: String,
        /// Status the writer read
        expected: String,
        /// Status currently stored
        actual: String,
    },

    /// Another ledger entry already links to this previous hash
    #[error("Ledger fork rejected: previous hash {0} is already claimed")]
    ChainConflict(String),
}
