//! Error types for the Simulator

use thiserror::Error;
use warrant_domain::ValidationError;

/// Errors that can occur during simulation
#[derive(Error, Debug)]
pub enum SimulatorError {
    /// Input exceeded a configured bound or was malformed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Reading stored policies failed; the original error is kept as the source
    #[error("Storage error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A rule could not be converted for comparison
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, SimulatorError>;
