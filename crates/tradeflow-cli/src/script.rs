//! Replay scripts
//!
//! A replay script is a JSON document describing one run against canned
//! backend replies:
//!
//! ```json
//! {
//!   "ticker": "AAPL",
//!   "trade_date": "2024-05-10",
//!   "config": { "max_debate_rounds": 1, "max_revisions": 2 },
//!   "replies": {
//!     "market_analyst": [
//!       { "kind": "generation", "tool_requests": [
//!         { "id": "q1", "tool_name": "quote", "arguments": { "ticker": "AAPL" } }
//!       ] },
//!       "Uptrend intact above the 50-day average."
//!     ]
//!   },
//!   "role_fallbacks": { "portfolio_manager": "{\"action\": \"HOLD\"}" },
//!   "fallback": "No strong view.",
//!   "tools": [ { "name": "quote", "output": "last 189.90" } ],
//!   "role_tools": { "market_analyst": ["quote"] }
//! }
//! ```
//!
//! A reply is either a plain string (a final text generation) or a tagged
//! [`ScriptedReply`].

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use tradeflow_core::Role;
use tradeflow_llm::{Generation, ScriptedGenerator, ScriptedReply, ToolDefinition};
use tradeflow_tools::{Tool, ToolOutput, ToolRegistry};
use tradeflow_workflow::{Orchestrator, RunConfig};

/// One scripted reply as written in the file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReplySpec {
    Text(String),
    Reply(ScriptedReply),
}

impl From<ReplySpec> for ScriptedReply {
    fn from(spec: ReplySpec) -> Self {
        match spec {
            ReplySpec::Text(text) => Generation::text(text).into(),
            ReplySpec::Reply(reply) => reply,
        }
    }
}

/// A tool answering every call with the same output
#[derive(Debug, Clone, Deserialize)]
pub struct CannedTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub output: String,
    /// Report `output` as a tool error
    #[serde(default)]
    pub error: bool,
}

#[async_trait]
impl Tool for CannedTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            self.name.clone(),
            self.description.clone(),
            json!({ "type": "object" }),
        )
    }

    async fn call(&self, arguments: Value) -> ToolOutput {
        debug!(tool = %self.name, %arguments, "Canned tool called");
        if self.error {
            ToolOutput::Error(self.output.clone())
        } else {
            ToolOutput::Text(self.output.clone())
        }
    }
}

/// A parsed replay script
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayScript {
    pub ticker: String,
    pub trade_date: NaiveDate,
    #[serde(default)]
    pub config: RunConfig,
    /// Per-role reply queues, consumed in order
    #[serde(default)]
    pub replies: BTreeMap<Role, Vec<ReplySpec>>,
    /// Per-role reply once the queue is empty
    #[serde(default)]
    pub role_fallbacks: BTreeMap<Role, ReplySpec>,
    /// Reply for any role with nothing else scripted
    #[serde(default)]
    pub fallback: Option<ReplySpec>,
    #[serde(default)]
    pub tools: Vec<CannedTool>,
    #[serde(default)]
    pub role_tools: BTreeMap<Role, Vec<String>>,
}

impl ReplayScript {
    /// Read and parse a script file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid script {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Scripted backend holding every reply in the file
    pub fn generator(&self) -> ScriptedGenerator {
        let mut generator = ScriptedGenerator::new();
        for (role, replies) in &self.replies {
            generator = generator.with_replies(*role, replies.iter().cloned().map(ScriptedReply::from));
        }
        for (role, reply) in &self.role_fallbacks {
            generator = generator.with_role_fallback(*role, reply.clone());
        }
        if let Some(reply) = &self.fallback {
            generator = generator.with_fallback(reply.clone());
        }
        generator
    }

    pub fn tool_registry(&self) -> ToolRegistry {
        self.tools
            .iter()
            .fold(ToolRegistry::builder(), |builder, tool| {
                builder.register(Arc::new(tool.clone()))
            })
            .build()
    }

    /// Orchestrator wired to this script's backend and tools
    pub fn orchestrator(&self, config: RunConfig) -> anyhow::Result<Orchestrator> {
        let mut builder = Orchestrator::builder()
            .generator(Arc::new(self.generator()))
            .tool_registry(Arc::new(self.tool_registry()))
            .config(config);
        for (role, names) in &self.role_tools {
            builder = builder.role_tools(*role, names.iter().cloned());
        }
        Ok(builder.build()?)
    }
}
