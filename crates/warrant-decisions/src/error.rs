//! Error types for decision operations

use thiserror::Error;
use warrant_domain::{DecisionId, ValidationError};
use warrant_ledger::LedgerError;
use warrant_policy::PolicyError;

/// Errors that can occur during repository operations
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Bad input or a forbidden status change
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No decision with this id
    #[error("Decision not found: {0}")]
    NotFound(DecisionId),

    /// Storage layer error, unchanged; a lost optimistic update surfaces here
    #[error("Storage error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Ledger append or read failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Policy lookup failed
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RepositoryError {
    pub(crate) fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RepositoryError::Store(Box::new(err))
    }

    /// The storage error, if this is one and it has type `E`
    pub fn store_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            RepositoryError::Store(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepositoryError>;
