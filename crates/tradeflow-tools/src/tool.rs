//! Tool trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tradeflow_llm::ToolDefinition;

/// Result of a tool invocation
///
/// Failures are data. A tool never panics or returns `Err`; it reports an
/// [`ToolOutput::Error`] that the router turns into error text for the
/// requesting role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum ToolOutput {
    Text(String),
    Error(String),
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Text handed back to the requesting role
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Error(message) => format!("Error: {message}"),
        }
    }
}

/// Trait for tools that workers can request
///
/// Each tool describes itself through a [`ToolDefinition`] whose name must be
/// unique within a [`ToolRegistry`](crate::ToolRegistry). Arguments are
/// passed through untouched; interpreting them is the tool's business.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and input schema
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the requested arguments
    async fn call(&self, arguments: Value) -> ToolOutput;
}
