//! Ownership-checked tool routing
//!
//! The router answers the pending requests of one role's most recent worker
//! turn and nothing else. Ownership is decided by the role tag on the worker
//! message, never by tool name: if another role's later turn asks for the
//! same tool, that request is invisible to this role's routing pass.

use crate::{ToolOutput, ToolRegistry};
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use tradeflow_core::{Message, Role, RunContext, ToolRequest};

/// Result text for requests beyond the per-turn cap
pub const SKIPPED_TOOL_REQUEST: &str = "skipped — too many requests this turn";

/// Executes a role's pending tool requests against the registry
#[derive(Debug, Clone)]
pub struct ToolRouter {
    registry: Arc<ToolRegistry>,
    max_requests_per_turn: usize,
    call_timeout: Duration,
}

impl ToolRouter {
    /// Create a router with a per-turn execution cap and a per-call timeout
    pub fn new(
        registry: Arc<ToolRegistry>,
        max_requests_per_turn: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            max_requests_per_turn,
            call_timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn max_requests_per_turn(&self) -> usize {
        self.max_requests_per_turn
    }

    /// Requests of `role`'s most recent worker turn that have no result yet
    ///
    /// Returns an empty list when the role's latest turn carries no requests,
    /// even if an older turn of the same role or a later turn of another role
    /// does.
    pub fn pending_requests(log: &[Message], role: Role) -> Vec<ToolRequest> {
        let Some(position) = log.iter().rposition(|m| m.is_worker_message_of(role)) else {
            return Vec::new();
        };

        let answered: HashSet<&str> = log[position + 1..]
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult {
                    request_id, owner, ..
                } if *owner == role => Some(request_id.as_str()),
                _ => None,
            })
            .collect();

        log[position]
            .tool_requests()
            .iter()
            .filter(|req| !answered.contains(req.id.as_str()))
            .cloned()
            .collect()
    }

    /// Execute the pending requests of `role` and return owner-tagged results
    ///
    /// At most `max_requests_per_turn` requests run, concurrently; the rest
    /// receive [`SKIPPED_TOOL_REQUEST`]. Results keep the order of the
    /// requests in the worker message.
    pub async fn route(&self, log: &[Message], role: Role, ctx: &RunContext) -> Vec<Message> {
        let pending = Self::pending_requests(log, role);
        if pending.is_empty() {
            debug!(role = %role, "No pending tool requests");
            return Vec::new();
        }

        let split = pending.len().min(self.max_requests_per_turn);
        let (to_run, to_skip) = pending.split_at(split);

        if !to_skip.is_empty() {
            warn!(
                role = %role,
                requested = pending.len(),
                cap = self.max_requests_per_turn,
                "Too many tool requests this turn; skipping the rest"
            );
            ctx.record_skipped_tool_requests(role, u32::try_from(to_skip.len()).unwrap_or(u32::MAX));
        }

        let executed = join_all(to_run.iter().map(|req| self.execute(req, role, ctx))).await;

        let skipped = to_skip
            .iter()
            .map(|req| Message::tool_result(req.id.clone(), role, SKIPPED_TOOL_REQUEST));

        executed.into_iter().chain(skipped).collect()
    }

    /// Route several roles against the same log
    pub async fn route_all(
        &self,
        log: &[Message],
        roles: &[Role],
        ctx: &RunContext,
    ) -> BTreeMap<Role, Vec<Message>> {
        let routed = join_all(roles.iter().map(|&role| async move {
            (role, self.route(log, role, ctx).await)
        }))
        .await;

        routed.into_iter().collect()
    }

    async fn execute(&self, request: &ToolRequest, role: Role, ctx: &RunContext) -> Message {
        let output = match self.registry.get(&request.tool_name) {
            None => ToolOutput::Error(format!("unknown tool '{}'", request.tool_name)),
            Some(tool) => {
                info!(
                    role = %role,
                    tool = %request.tool_name,
                    request_id = %request.id,
                    "Executing tool"
                );
                match timeout(self.call_timeout, tool.call(request.arguments.clone())).await {
                    Ok(output) => output,
                    Err(_) => ToolOutput::Error(format!(
                        "tool '{}' timed out after {:?}",
                        request.tool_name, self.call_timeout
                    )),
                }
            }
        };

        if let ToolOutput::Error(message) = &output {
            warn!(
                role = %role,
                tool = %request.tool_name,
                request_id = %request.id,
                error = %message,
                "Tool request failed"
            );
        }
        ctx.record_tool_call(role, !output.is_error());

        Message::tool_result(request.id.clone(), role, output.into_text())
    }
}
