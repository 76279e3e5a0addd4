//! Generation request and response types

use crate::ToolDefinition;
use serde::{Deserialize, Serialize};
use tradeflow_core::{Message, Role, ToolRequest};

/// Whether the backend may answer with tool requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    /// Tool requests are allowed
    #[default]
    Allowed,
    /// Text only; used to force a worker loop to terminate
    Forbidden,
}

/// Request for the next turn of one role's conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Role the generation is for
    pub role: Role,

    /// Model identifier (backend-specific)
    pub model: String,

    /// System prompt for the role
    pub system: String,

    /// The role's conversation so far
    pub messages: Vec<Message>,

    /// Tools available to the role (empty when forbidden)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether tool requests are allowed
    pub tool_mode: ToolMode,

    /// Maximum tokens to generate
    pub max_tokens: usize,

    /// Sampling temperature (0.0-1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    /// Create a builder for generation requests
    pub fn builder(role: Role, model: impl Into<String>) -> GenerationRequestBuilder {
        GenerationRequestBuilder::new(role, model)
    }
}

/// Normalized backend output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text
    #[serde(default)]
    pub text: String,

    /// Tool requests (empty for a final answer)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_requests: Vec<ToolRequest>,
}

impl Generation {
    /// A final text answer
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_requests: Vec::new(),
        }
    }

    /// A turn requesting tools
    pub fn with_tools(text: impl Into<String>, tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            text: text.into(),
            tool_requests,
        }
    }

    /// Check if this turn requests tools
    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests.is_empty()
    }

    /// No text and no tool requests
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.tool_requests.is_empty()
    }
}

/// Builder for GenerationRequest
pub struct GenerationRequestBuilder {
    role: Role,
    model: String,
    system: String,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    tool_mode: ToolMode,
    max_tokens: usize,
    temperature: Option<f32>,
}

impl GenerationRequestBuilder {
    /// Create a new builder
    pub fn new(role: Role, model: impl Into<String>) -> Self {
        Self {
            role,
            model: model.into(),
            system: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            tool_mode: ToolMode::Allowed,
            max_tokens: 4096,
            temperature: None,
        }
    }

    /// Set the conversation messages
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Set the available tools
    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the tool mode
    pub fn tool_mode(mut self, mode: ToolMode) -> Self {
        self.tool_mode = mode;
        self
    }

    /// Set the maximum tokens
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build the request; a forbidden request carries no tool definitions
    pub fn build(self) -> GenerationRequest {
        let tools = match self.tool_mode {
            ToolMode::Allowed => self.tools,
            ToolMode::Forbidden => Vec::new(),
        };

        GenerationRequest {
            role: self.role,
            model: self.model,
            system: self.system,
            messages: self.messages,
            tools,
            tool_mode: self.tool_mode,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let request = GenerationRequest::builder(Role::NewsAnalyst, "test-model")
            .system("You read the news")
            .messages(vec![Message::user("600519")])
            .tools(vec![ToolDefinition::new("search", "Search", json!({}))])
            .max_tokens(2048)
            .temperature(Some(0.2))
            .build();

        assert_eq!(request.role, Role::NewsAnalyst);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.max_tokens, 2048);
        assert_eq!(request.tool_mode, ToolMode::Allowed);
    }

    #[test]
    fn test_forbidden_request_drops_tools() {
        let request = GenerationRequest::builder(Role::Trader, "test-model")
            .tools(vec![ToolDefinition::new("search", "Search", json!({}))])
            .tool_mode(ToolMode::Forbidden)
            .build();

        assert!(request.tools.is_empty());
    }

    #[test]
    fn test_generation_emptiness() {
        assert!(Generation::text("   ").is_empty());
        assert!(!Generation::text("BUY").is_empty());
        let turn = Generation::with_tools("", vec![ToolRequest::new("1", "search", json!({}))]);
        assert!(!turn.is_empty());
        assert!(turn.has_tool_requests());
    }
}
