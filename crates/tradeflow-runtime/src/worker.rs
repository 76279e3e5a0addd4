//! Worker task: one role's bounded generate/route-tools loop
//!
//! The loop is a small state machine:
//!
//! ```text
//! AwaitingGeneration --tool requests--> AwaitingTools --results--> AwaitingGeneration
//! AwaitingGeneration --final text-----> Done
//! AwaitingGeneration --forced & empty-> Failed
//! ```
//!
//! At most `max_iterations` generations are made. The last one is always a
//! [`ToolMode::Forbidden`] call, so a backend that keeps asking for tools is
//! cut off after exactly `max_iterations` round-trips.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tradeflow_core::{Message, Role, RunContext, conversation_for};
use tradeflow_llm::{CallPolicy, Generation, GenerationRequest, Generator, ToolDefinition, ToolMode};
use tradeflow_tools::{SKIPPED_TOOL_REQUEST, ToolRouter};

/// Configuration for one worker loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum generation round-trips, including the forced final one
    pub max_iterations: usize,

    /// Model to use
    pub model: String,

    /// Max tokens per generation
    pub max_tokens: usize,

    /// Temperature
    pub temperature: Option<f32>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            model: "default".to_string(),
            max_tokens: 4096,
            temperature: Some(0.7),
        }
    }
}

/// Worker loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    AwaitingGeneration,
    AwaitingTools,
    Done,
    Failed,
}

/// What a finished worker hands back to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub role: Role,

    /// Final report, or the fallback placeholder when the worker failed
    pub report: String,

    /// Terminal state: `Done` or `Failed`
    pub state: WorkerState,

    /// Messages this worker produced, in order (seed excluded)
    pub messages: Vec<Message>,

    /// Generations made
    pub iterations: usize,

    /// Tool requests actually executed
    pub tool_calls: u32,
}

impl WorkerOutcome {
    pub fn is_fallback(&self) -> bool {
        self.state == WorkerState::Failed
    }
}

/// Placeholder report for a role that produced nothing usable
pub fn fallback_report(role: Role, reason: &str) -> String {
    format!("[{role} report unavailable: {reason}]")
}

/// One role's request/response loop
///
/// The task owns a private message log seeded from the run state snapshot.
/// It never touches the shared run state; its outcome is merged by the
/// orchestrator.
pub struct WorkerTask {
    role: Role,
    system_prompt: String,
    seed: Vec<Message>,
    tools: Vec<ToolDefinition>,
    config: WorkerConfig,
    generator: Arc<dyn Generator>,
    router: ToolRouter,
    policy: CallPolicy,
}

impl WorkerTask {
    /// Create a worker task
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role: Role,
        system_prompt: impl Into<String>,
        seed: Vec<Message>,
        tools: Vec<ToolDefinition>,
        config: WorkerConfig,
        generator: Arc<dyn Generator>,
        router: ToolRouter,
        policy: CallPolicy,
    ) -> Self {
        Self {
            role,
            system_prompt: system_prompt.into(),
            seed,
            tools,
            config,
            generator,
            router,
            policy,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Run the loop to a terminal state
    pub async fn run(self, ctx: &RunContext) -> WorkerOutcome {
        let role = self.role;
        let max_iterations = self.config.max_iterations.max(1);
        let seed_len = self.seed.len();
        let mut log = self.seed.clone();

        let mut state = WorkerState::AwaitingGeneration;
        let mut iteration = 0;
        let mut tool_calls = 0;
        let mut report = String::new();

        info!(role = %role, max_iterations, "Worker started");

        loop {
            match state {
                WorkerState::AwaitingGeneration => {
                    iteration += 1;
                    let forced = iteration >= max_iterations;
                    let generation = self.generate(&log, iteration, forced, ctx).await;

                    state = match generation {
                        Some(g) if !forced && g.has_tool_requests() => {
                            info!(
                                role = %role,
                                iteration,
                                requests = g.tool_requests.len(),
                                "Worker requested tools"
                            );
                            log.push(Message::worker_with_tools(role, g.text, g.tool_requests));
                            WorkerState::AwaitingTools
                        }
                        Some(g) if !g.text.trim().is_empty() => {
                            if g.has_tool_requests() {
                                warn!(role = %role, "Ignoring tool requests on a forced final turn");
                            }
                            report.clone_from(&g.text);
                            log.push(Message::worker(role, g.text));
                            WorkerState::Done
                        }
                        _ if forced => WorkerState::Failed,
                        _ => {
                            warn!(role = %role, iteration, "Empty turn");
                            WorkerState::AwaitingGeneration
                        }
                    };
                }

                WorkerState::AwaitingTools => {
                    let results = self.router.route(&log, role, ctx).await;
                    tool_calls += results
                        .iter()
                        .filter(|m| m.text() != SKIPPED_TOOL_REQUEST)
                        .count() as u32;
                    log.extend(results);
                    state = WorkerState::AwaitingGeneration;
                }

                WorkerState::Done | WorkerState::Failed => break,
            }
        }

        if state == WorkerState::Failed {
            report = fallback_report(
                role,
                &format!("no usable output after {iteration} attempts"),
            );
            warn!(role = %role, iteration, "Worker failed; using fallback report");
        } else {
            info!(role = %role, iteration, tool_calls, "Worker completed");
        }

        WorkerOutcome {
            role,
            report,
            state,
            messages: log.split_off(seed_len),
            iterations: iteration,
            tool_calls,
        }
    }

    /// One generation under the call policy; `None` on failure
    async fn generate(
        &self,
        log: &[Message],
        iteration: usize,
        forced: bool,
        ctx: &RunContext,
    ) -> Option<Generation> {
        let tool_mode = if forced {
            ToolMode::Forbidden
        } else {
            ToolMode::Allowed
        };

        let request = GenerationRequest::builder(self.role, &self.config.model)
            .system(self.system_prompt.clone())
            .messages(conversation_for(log, self.role))
            .tools(self.tools.clone())
            .tool_mode(tool_mode)
            .max_tokens(self.config.max_tokens)
            .temperature(self.config.temperature)
            .build();

        debug!(
            role = %self.role,
            iteration,
            ?tool_mode,
            messages = request.messages.len(),
            "Sending generation request"
        );
        ctx.record_generation(self.role, forced);

        let attempted = self
            .policy
            .execute(self.role.as_str(), || self.generator.generate(request.clone()))
            .await;

        for _ in 0..attempted.retries() {
            ctx.record_retry(self.role);
        }

        match attempted.result {
            Ok(generation) => Some(generation),
            Err(e) => {
                warn!(role = %self.role, iteration, error = %e, "Generation failed");
                ctx.record_failed_generation(self.role);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tradeflow_core::ToolRequest;
    use tradeflow_llm::{ScriptedGenerator, ScriptedReply};
    use tradeflow_tools::{Tool, ToolOutput, ToolRegistry};

    struct QuoteTool;

    #[async_trait]
    impl Tool for QuoteTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("quote", "Latest quote", json!({}))
        }

        async fn call(&self, arguments: Value) -> ToolOutput {
            ToolOutput::Text(format!("{} last 101.5", arguments["ticker"]))
        }
    }

    fn ctx() -> RunContext {
        RunContext::new("AAPL", NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
    }

    fn task(generator: Arc<ScriptedGenerator>, max_iterations: usize) -> WorkerTask {
        let registry = ToolRegistry::builder().register(Arc::new(QuoteTool)).build();
        let router = ToolRouter::new(Arc::new(registry), 3, Duration::from_secs(1));
        WorkerTask::new(
            Role::MarketAnalyst,
            "You analyse price action.",
            vec![Message::user("Analyse AAPL for 2024-05-10")],
            router.registry().definitions(),
            WorkerConfig {
                max_iterations,
                ..WorkerConfig::default()
            },
            generator,
            router,
            CallPolicy::fast(),
        )
    }

    fn quote_turn(id: &str) -> Generation {
        Generation::with_tools("", vec![ToolRequest::new(id, "quote", json!({"ticker": "AAPL"}))])
    }

    #[tokio::test]
    async fn test_tool_round_trip_then_report() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .with_reply(Role::MarketAnalyst, quote_turn("q1"))
                .with_reply(Role::MarketAnalyst, Generation::text("Uptrend intact.")),
        );

        let outcome = task(generator.clone(), 5).run(&ctx()).await;

        assert_eq!(outcome.state, WorkerState::Done);
        assert_eq!(outcome.report, "Uptrend intact.");
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls, 1);
        // worker turn, tool result, final turn
        assert_eq!(outcome.messages.len(), 3);
        assert_eq!(outcome.messages[1].text(), "\"AAPL\" last 101.5");

        let calls = generator.calls();
        assert_eq!(calls[0].message_count, 1);
        assert_eq!(calls[1].message_count, 3);
        assert_eq!(calls[0].tool_names, vec!["quote".to_string()]);
    }

    #[tokio::test]
    async fn test_runaway_tool_requests_are_bounded() {
        let generator = Arc::new(
            ScriptedGenerator::new().with_role_fallback(Role::MarketAnalyst, quote_turn("again")),
        );
        let ctx = ctx();

        let outcome = task(generator.clone(), 4).run(&ctx).await;

        assert_eq!(generator.call_count(Role::MarketAnalyst), 4);
        let modes: Vec<ToolMode> = generator.calls().iter().map(|c| c.tool_mode).collect();
        assert_eq!(
            modes,
            vec![
                ToolMode::Allowed,
                ToolMode::Allowed,
                ToolMode::Allowed,
                ToolMode::Forbidden
            ]
        );
        assert_eq!(outcome.state, WorkerState::Failed);
        assert!(outcome.is_fallback());
        assert_eq!(
            outcome.report,
            "[market_analyst report unavailable: no usable output after 4 attempts]"
        );
        assert_eq!(ctx.stats(Role::MarketAnalyst).forced_generations, 1);
    }

    #[tokio::test]
    async fn test_forced_turn_with_text_completes() {
        let turn = Generation::with_tools(
            "Momentum is fading.",
            vec![ToolRequest::new("q", "quote", json!({"ticker": "AAPL"}))],
        );
        let generator =
            Arc::new(ScriptedGenerator::new().with_role_fallback(Role::MarketAnalyst, turn));

        let outcome = task(generator, 2).run(&ctx()).await;

        assert_eq!(outcome.state, WorkerState::Done);
        assert_eq!(outcome.report, "Momentum is fading.");
        assert_eq!(outcome.iterations, 2);
    }

    #[tokio::test]
    async fn test_generation_failures_count_as_empty_turns() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .with_reply(Role::MarketAnalyst, ScriptedReply::failure("refused", false))
                .with_reply(Role::MarketAnalyst, Generation::text("   "))
                .with_reply(Role::MarketAnalyst, Generation::text("Range-bound.")),
        );
        let ctx = ctx();

        let outcome = task(generator, 5).run(&ctx).await;

        assert_eq!(outcome.state, WorkerState::Done);
        assert_eq!(outcome.report, "Range-bound.");
        assert_eq!(outcome.iterations, 3);
        assert_eq!(ctx.stats(Role::MarketAnalyst).failed_generations, 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_within_one_turn() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .with_reply(Role::MarketAnalyst, ScriptedReply::failure("reset", true))
                .with_reply(Role::MarketAnalyst, Generation::text("Breakout.")),
        );
        let ctx = ctx();

        let outcome = task(generator, 5).run(&ctx).await;

        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.report, "Breakout.");
        let stats = ctx.stats(Role::MarketAnalyst);
        assert_eq!(stats.generations, 1);
        assert_eq!(stats.retries, 1);
    }

    #[tokio::test]
    async fn test_single_iteration_is_forced() {
        let generator = Arc::new(ScriptedGenerator::new());

        let outcome = task(generator.clone(), 1).run(&ctx()).await;

        assert_eq!(generator.calls()[0].tool_mode, ToolMode::Forbidden);
        assert!(generator.calls()[0].tool_names.is_empty());
        assert_eq!(outcome.state, WorkerState::Failed);
    }
}
