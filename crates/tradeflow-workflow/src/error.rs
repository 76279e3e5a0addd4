//! Error types for run orchestration

use thiserror::Error;

/// Errors raised while assembling an orchestrator
///
/// A run itself never fails: once an [`Orchestrator`](crate::Orchestrator)
/// is built, every failure inside a run degrades to a placeholder report.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Invalid run configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A role prompt or stage briefing is missing from the catalog
    #[error("No prompt template named '{0}'")]
    MissingPrompt(String),

    /// Prompt catalog error
    #[error("Prompt error: {0}")]
    Prompt(#[from] tradeflow_prompt::PromptError),

    /// Core error
    #[error(transparent)]
    Core(#[from] tradeflow_core::Error),
}

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

impl From<WorkflowError> for tradeflow_core::Error {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Core(inner) => inner,
            WorkflowError::ConfigError(msg) => tradeflow_core::Error::InvalidConfig(msg),
            other => tradeflow_core::Error::InitializationFailed(other.to_string()),
        }
    }
}
