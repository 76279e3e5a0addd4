//! Message log types
//!
//! The run keeps one append-only log of [`Message`]s. Worker messages and
//! tool results carry the owning [`Role`] so that one worker's tool traffic
//! never shows up in another worker's view of the conversation.

use crate::Role;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// A tool invocation requested by a worker
///
/// `arguments` are opaque to the orchestration layer; only `id` and
/// `tool_name` are used for dispatch and tagging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Unique ID for this request
    pub id: String,
    /// Name of the tool to run
    pub tool_name: String,
    /// Tool input parameters (JSON)
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolRequest {
    /// Create a new tool request
    pub fn new(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// One entry of the run's message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Instruction or context handed to a worker
    User {
        /// Message text
        text: String,
    },

    /// Output of a worker's generation step
    Worker {
        /// Role that produced the message
        role: Role,
        /// Generated text
        text: String,
        /// Tool requests awaiting results
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_requests: Vec<ToolRequest>,
    },

    /// Result of a tool request, tagged with the requesting role
    ToolResult {
        /// ID of the request this result answers
        request_id: String,
        /// Role that owns the request
        owner: Role,
        /// Result text (or error text)
        text: String,
    },
}

impl Message {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    /// Create a worker message without tool requests
    pub fn worker(role: Role, text: impl Into<String>) -> Self {
        Self::Worker {
            role,
            text: text.into(),
            tool_requests: Vec::new(),
        }
    }

    /// Create a worker message carrying tool requests
    pub fn worker_with_tools(
        role: Role,
        text: impl Into<String>,
        tool_requests: Vec<ToolRequest>,
    ) -> Self {
        Self::Worker {
            role,
            text: text.into(),
            tool_requests,
        }
    }

    /// Create a tool result owned by `owner`
    pub fn tool_result(request_id: impl Into<String>, owner: Role, text: impl Into<String>) -> Self {
        Self::ToolResult {
            request_id: request_id.into(),
            owner,
            text: text.into(),
        }
    }

    /// Text content of the message
    pub fn text(&self) -> &str {
        match self {
            Self::User { text } | Self::Worker { text, .. } | Self::ToolResult { text, .. } => text,
        }
    }

    /// Role tag, if any (user messages are untagged)
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::User { .. } => None,
            Self::Worker { role, .. } => Some(*role),
            Self::ToolResult { owner, .. } => Some(*owner),
        }
    }

    /// Tool requests carried by a worker message
    pub fn tool_requests(&self) -> &[ToolRequest] {
        match self {
            Self::Worker { tool_requests, .. } => tool_requests,
            _ => &[],
        }
    }

    /// Check if this message carries any tool requests
    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests().is_empty()
    }

    /// Whether this is a worker message produced by `role`
    pub fn is_worker_message_of(&self, role: Role) -> bool {
        matches!(self, Self::Worker { role: r, .. } if *r == role)
    }
}

/// Build the conversation `role` is allowed to see from a shared log
///
/// Keeps user messages, the role's own worker messages, and tool results
/// that answer one of the role's earlier requests. A result tagged for
/// another role, or answering a request the role never made, is dropped
/// and logged. Duplicate results for the same request within one worker
/// turn keep the first one; a later turn reusing the id starts afresh.
pub fn conversation_for(log: &[Message], role: Role) -> Vec<Message> {
    let mut requested: HashSet<&str> = HashSet::new();
    let mut answered: HashSet<&str> = HashSet::new();
    let mut conversation = Vec::with_capacity(log.len());

    for message in log {
        match message {
            Message::User { .. } => conversation.push(message.clone()),
            Message::Worker {
                role: r,
                tool_requests,
                ..
            } => {
                if *r == role {
                    answered.clear();
                    requested.extend(tool_requests.iter().map(|req| req.id.as_str()));
                    conversation.push(message.clone());
                }
            }
            Message::ToolResult {
                request_id, owner, ..
            } => {
                if *owner != role {
                    continue;
                }
                if !requested.contains(request_id.as_str()) {
                    warn!(
                        role = %role,
                        request_id = %request_id,
                        "Dropping tool result with no matching request"
                    );
                    continue;
                }
                if answered.insert(request_id.as_str()) {
                    conversation.push(message.clone());
                }
            }
        }
    }

    conversation
}
