//! Error types for the CLI application.

use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid policy, context or decision input
    #[error(transparent)]
    Validation(#[from] warrant_domain::ValidationError),

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] warrant_store::StoreError),

    /// Decision operation failed
    #[error("{0}")]
    Repository(#[from] warrant_decisions::RepositoryError),

    /// Ledger read failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] warrant_ledger::LedgerError),

    /// Simulation failed
    #[error("Simulation error: {0}")]
    Simulator(#[from] warrant_simulator::SimulatorError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The ledger failed verification
    #[error("Ledger integrity check failed: {0}")]
    Integrity(String),

    /// Scenarios did not produce their expected decisions
    #[error("{0} scenario(s) failed")]
    ScenariosFailed(usize),
}
