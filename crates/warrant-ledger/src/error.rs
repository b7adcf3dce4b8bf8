//! Error types for the ledger

use thiserror::Error;

/// Errors that can occur while recording or reading the ledger
///
/// Integrity findings are reported through
/// [`ChainVerification`](crate::ChainVerification), never as an error.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The underlying store failed; the original error is kept as the source
    #[error("Storage error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    pub(crate) fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LedgerError::Store(Box::new(err))
    }
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
