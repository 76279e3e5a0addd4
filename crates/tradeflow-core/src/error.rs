//! Error types for tradeflow-core

use thiserror::Error;

/// Result type alias for tradeflow-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared by the orchestration crates
#[derive(Error, Debug)]
pub enum Error {
    /// Generic error message
    #[error("{0}")]
    Generic(String),

    /// A component could not be assembled
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Invalid run configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unknown role name
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// A report slot was written twice
    #[error("Report for {0} already written")]
    ReportAlreadyWritten(String),
}
