//! Policy engine error types

use thiserror::Error;
use warrant_domain::ValidationError;

/// Errors that can occur during registry operations
///
/// Evaluation itself never fails; unusable conditions simply do not match.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// Invalid policy, binding or status change
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The underlying store failed; the original error is kept as the source
    #[error("Storage error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PolicyError {
    pub(crate) fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PolicyError::Store(Box::new(err))
    }
}
