//! Error types for generation calls

use std::time::Duration;
use thiserror::Error;

/// Result type for generation calls
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Errors a generative backend can report
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// Request could not be delivered (network, connection reset)
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Invalid API key or authentication failed
    #[error("Invalid API key or authentication failed")]
    AuthenticationFailed,

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// The call did not finish within the per-call timeout
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// Provider-specific error
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl GenerationError {
    /// Whether the failure is transient and worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed(_) | Self::RateLimitExceeded(_) | Self::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        Self::UnexpectedResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GenerationError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(GenerationError::RateLimitExceeded("429".into()).is_retryable());
        assert!(GenerationError::RequestFailed("reset".into()).is_retryable());
        assert!(!GenerationError::AuthenticationFailed.is_retryable());
        assert!(!GenerationError::InvalidRequest("bad".into()).is_retryable());
    }
}
