//! Deterministic scripted backend
//!
//! [`ScriptedGenerator`] answers from per-role queues of canned replies. It is
//! used by the test suites and by the CLI `replay` command, which loads a
//! script file and drives a whole run without a model service.

use crate::{Generation, GenerationError, GenerationRequest, Generator, Result, ToolMode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use tradeflow_core::{Role, ToolRequest};
use tracing::debug;

/// One canned backend reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedReply {
    /// Return a generation
    Generation {
        #[serde(default)]
        text: String,
        #[serde(default)]
        tool_requests: Vec<ToolRequest>,
    },
    /// Fail the call
    Failure {
        message: String,
        #[serde(default)]
        retryable: bool,
    },
    /// Never answer; exercises the per-call timeout
    Stall,
}

impl ScriptedReply {
    /// A failing reply
    pub fn failure(message: impl Into<String>, retryable: bool) -> Self {
        Self::Failure {
            message: message.into(),
            retryable,
        }
    }
}

impl From<Generation> for ScriptedReply {
    fn from(generation: Generation) -> Self {
        Self::Generation {
            text: generation.text,
            tool_requests: generation.tool_requests,
        }
    }
}

/// A request observed by the scripted backend
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub role: Role,
    pub tool_mode: ToolMode,
    pub message_count: usize,
    pub tool_names: Vec<String>,
}

/// Backend answering from per-role reply queues
///
/// When a role's queue is empty the role fallback is used, then the global
/// fallback, then an empty generation. A scripted turn with tool requests
/// loses them when the request forbids tools.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    queues: Mutex<HashMap<Role, VecDeque<ScriptedReply>>>,
    role_fallbacks: HashMap<Role, ScriptedReply>,
    fallback: Option<ScriptedReply>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGenerator {
    /// Create an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for a role
    pub fn with_reply(self, role: Role, reply: impl Into<ScriptedReply>) -> Self {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(role)
            .or_default()
            .push_back(reply.into());
        self
    }

    /// Queue several replies for a role, in order
    pub fn with_replies<I, R>(mut self, role: Role, replies: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ScriptedReply>,
    {
        for reply in replies {
            self = self.with_reply(role, reply);
        }
        self
    }

    /// Reply used for a role once its queue is exhausted
    pub fn with_role_fallback(mut self, role: Role, reply: impl Into<ScriptedReply>) -> Self {
        self.role_fallbacks.insert(role, reply.into());
        self
    }

    /// Reply used for any role without a queued or role-specific reply
    pub fn with_fallback(mut self, reply: impl Into<ScriptedReply>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Every request seen so far, in arrival order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests seen for a role
    pub fn call_count(&self, role: Role) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| call.role == role)
            .count()
    }

    /// Replies still queued for a role
    pub fn remaining(&self, role: Role) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&role)
            .map_or(0, VecDeque::len)
    }

    fn next_reply(&self, role: Role) -> ScriptedReply {
        let queued = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&role)
            .and_then(VecDeque::pop_front);

        queued
            .or_else(|| self.role_fallbacks.get(&role).cloned())
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Generation::default().into())
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                role: request.role,
                tool_mode: request.tool_mode,
                message_count: request.messages.len(),
                tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
            });

        let reply = self.next_reply(request.role);
        debug!(role = %request.role, ?reply, "Scripted reply");

        match reply {
            ScriptedReply::Generation {
                text,
                mut tool_requests,
            } => {
                if request.tool_mode == ToolMode::Forbidden {
                    tool_requests.clear();
                }
                Ok(Generation {
                    text,
                    tool_requests,
                })
            }
            ScriptedReply::Failure { message, retryable } => Err(if retryable {
                GenerationError::RequestFailed(message)
            } else {
                GenerationError::ProviderError(message)
            }),
            ScriptedReply::Stall => std::future::pending().await,
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(role: Role, mode: ToolMode) -> GenerationRequest {
        GenerationRequest::builder(role, "scripted")
            .tool_mode(mode)
            .build()
    }

    #[tokio::test]
    async fn test_replies_are_served_in_order_per_role() {
        let generator = ScriptedGenerator::new()
            .with_replies(
                Role::MarketAnalyst,
                [Generation::text("first"), Generation::text("second")],
            )
            .with_reply(Role::NewsAnalyst, Generation::text("news"));

        let news = generator
            .generate(request(Role::NewsAnalyst, ToolMode::Allowed))
            .await
            .unwrap();
        let first = generator
            .generate(request(Role::MarketAnalyst, ToolMode::Allowed))
            .await
            .unwrap();
        let second = generator
            .generate(request(Role::MarketAnalyst, ToolMode::Allowed))
            .await
            .unwrap();

        assert_eq!(news.text, "news");
        assert_eq!(first.text, "first");
        assert_eq!(second.text, "second");
        assert_eq!(generator.call_count(Role::MarketAnalyst), 2);
        assert_eq!(generator.remaining(Role::MarketAnalyst), 0);
    }

    #[tokio::test]
    async fn test_fallbacks_apply_once_queue_is_empty() {
        let generator = ScriptedGenerator::new()
            .with_role_fallback(Role::Trader, Generation::text("HOLD"))
            .with_fallback(Generation::text("generic"));

        let trader = generator
            .generate(request(Role::Trader, ToolMode::Allowed))
            .await
            .unwrap();
        let other = generator
            .generate(request(Role::NewsAnalyst, ToolMode::Allowed))
            .await
            .unwrap();

        assert_eq!(trader.text, "HOLD");
        assert_eq!(other.text, "generic");
        assert!(
            ScriptedGenerator::new()
                .generate(request(Role::Trader, ToolMode::Allowed))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_forbidden_mode_strips_tool_requests() {
        let turn = Generation::with_tools(
            "need data",
            vec![ToolRequest::new("c1", "quote", json!({"ticker": "AAPL"}))],
        );
        let generator = ScriptedGenerator::new().with_role_fallback(Role::MarketAnalyst, turn);

        let allowed = generator
            .generate(request(Role::MarketAnalyst, ToolMode::Allowed))
            .await
            .unwrap();
        let forbidden = generator
            .generate(request(Role::MarketAnalyst, ToolMode::Forbidden))
            .await
            .unwrap();

        assert!(allowed.has_tool_requests());
        assert!(!forbidden.has_tool_requests());
        assert_eq!(forbidden.text, "need data");
        assert_eq!(generator.calls()[1].tool_mode, ToolMode::Forbidden);
    }

    #[tokio::test]
    async fn test_failure_reply_maps_retryability() {
        let generator = ScriptedGenerator::new()
            .with_reply(Role::Trader, ScriptedReply::failure("reset", true))
            .with_reply(Role::Trader, ScriptedReply::failure("refused", false));

        let transient = generator
            .generate(request(Role::Trader, ToolMode::Allowed))
            .await
            .unwrap_err();
        let permanent = generator
            .generate(request(Role::Trader, ToolMode::Allowed))
            .await
            .unwrap_err();

        assert!(transient.is_retryable());
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn test_reply_deserializes_from_script_json() {
        let replies: Vec<ScriptedReply> = serde_json::from_value(json!([
            {"kind": "generation", "text": "hello"},
            {"kind": "generation", "tool_requests": [
                {"id": "c1", "tool_name": "quote", "arguments": {"ticker": "AAPL"}}
            ]},
            {"kind": "failure", "message": "boom"},
            {"kind": "stall"}
        ]))
        .unwrap();

        assert_eq!(replies.len(), 4);
        assert_eq!(replies[3], ScriptedReply::Stall);
        assert!(matches!(
            &replies[2],
            ScriptedReply::Failure { retryable: false, .. }
        ));
    }
}
