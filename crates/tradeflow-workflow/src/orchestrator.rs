//! Run orchestrator
//!
//! Drives one run from the analyst fan-out to the final decision:
//!
//! 1. Fan out the analyst group on a bounded pool.
//! 2. Join: merge each outcome as it completes. The join is a plain barrier
//!    over the whole group; completion order does not matter.
//! 3. Gate: extract the metrics block (fundamentals first) and evaluate the
//!    risk rules. REJECT skips the debate.
//! 4. Debate (on PASS): bull/bear rounds, then the research manager.
//! 5. Synthesis: trader draft, review/revise loop, portfolio manager.
//!
//! The orchestrator is the only writer of [`RunState`]. Every failure
//! inside a run degrades to a placeholder; [`Orchestrator::run`] always
//! returns a [`RunOutcome`].

use crate::config::RunConfig;
use crate::debate::DebateStage;
use crate::outcome::{RevisionSummary, RunOutcome, RunStatus};
use crate::prompts::{
    ANALYST_TASK, DECISION_TASK, RunPrompts, TASKS, TRADER_TASK, default_catalog, report_views,
};
use crate::revision::RevisionController;
use crate::state::{Report, RiskState, RunState};
use crate::verdict::{ParseSource, TradeAction, TradeDecision, parse_decision};
use crate::{Result, WorkflowError};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tradeflow_core::{Error, Message, Role, RunContext};
use tradeflow_llm::Generator;
use tradeflow_prompt::PromptCatalog;
use tradeflow_risk::{METRICS_BLOCK, MetricsSnapshot, RiskAssessment, evaluate, extract};
use tradeflow_runtime::{WorkerOutcome, WorkerRuntime};
use tradeflow_tools::ToolRegistry;

/// Runs analyses end to end
///
/// # Example
///
/// ```no_run
/// use chrono::NaiveDate;
/// use std::sync::Arc;
/// use tradeflow_llm::ScriptedGenerator;
/// use tradeflow_workflow::{Orchestrator, RunConfig};
///
/// # async fn example() -> tradeflow_workflow::Result<()> {
/// let orchestrator = Orchestrator::builder()
///     .generator(Arc::new(ScriptedGenerator::new()))
///     .config(RunConfig::default())
///     .build()?;
///
/// let outcome = orchestrator
///     .run("AAPL", NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
///     .await;
/// println!("{}", outcome.render_text());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Orchestrator {
    runtime: WorkerRuntime,
    catalog: PromptCatalog,
    config: RunConfig,
}

impl Orchestrator {
    /// Create a new orchestrator builder
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn runtime(&self) -> &WorkerRuntime {
        &self.runtime
    }

    /// Analyse `ticker` for `trade_date`
    pub async fn run(&self, ticker: &str, trade_date: NaiveDate) -> RunOutcome {
        let ctx = RunContext::new(ticker, trade_date);
        let prompts = RunPrompts::new(&self.catalog, ticker, trade_date);
        let mut state = RunState::new(ticker, trade_date);

        info!(
            run_id = ctx.run_id(),
            ticker,
            %trade_date,
            analysts = self.config.analysts.len(),
            "Run started"
        );

        self.run_analysts(&prompts, &mut state, &ctx).await;

        if self.all_analysts_failed(&state) {
            return self.degraded(state, &ctx);
        }

        let assessment = self.gate(&mut state);
        let risk_summary = assessment.summary();
        let status = if assessment.is_reject() {
            info!(
                rejecting = assessment.rejecting_flags().count(),
                "Risk gate rejected; skipping debate"
            );
            RunStatus::DebateSkipped
        } else {
            self.run_debate(&prompts, &mut state, &risk_summary, &ctx)
                .await;
            RunStatus::Completed
        };

        let (revision, decision, final_report) = self
            .synthesize(&prompts, &mut state, &risk_summary, &ctx)
            .await;

        let calls = ctx.finalize();
        info!(
            run_id = ctx.run_id(),
            ?status,
            action = %decision.action,
            generations = calls.totals.generations,
            duration_ms = calls.duration_ms,
            "Run finished"
        );

        RunOutcome {
            run_id: ctx.run_id().to_string(),
            status,
            decision,
            final_report,
            revision,
            state,
            calls,
        }
    }

    /// Fan out the analysts and merge each outcome as it completes
    async fn run_analysts(&self, prompts: &RunPrompts<'_>, state: &mut RunState, ctx: &RunContext) {
        state.push_message(Message::user(prompts.briefing(ANALYST_TASK, json!({}))));
        let seed = state.messages().to_vec();

        let mut tasks = Vec::with_capacity(self.config.analysts.len());
        for &role in &self.config.analysts {
            let system = prompts.system(role);
            state.record_prompt_version(role, system.version);
            tasks.push(self.runtime.create_worker(role, system.text, seed.clone()));
        }

        let mut completions = stream::iter(tasks)
            .map(|task| task.run(ctx))
            .buffer_unordered(self.config.max_concurrency);

        while let Some(outcome) = completions.next().await {
            debug!(
                role = %outcome.role,
                state = ?outcome.state,
                iterations = outcome.iterations,
                "Analyst joined"
            );
            state.merge(&outcome);
        }
    }

    fn all_analysts_failed(&self, state: &RunState) -> bool {
        self.config
            .analysts
            .iter()
            .all(|role| state.report(*role).is_none_or(|r| r.fallback))
    }

    /// Analysts in metrics priority order: fundamentals first
    fn metrics_order(&self) -> Vec<Role> {
        let mut order = self.config.analysts.clone();
        order.sort_by_key(|role| *role != Role::FundamentalsAnalyst);
        order
    }

    fn gate(&self, state: &mut RunState) -> RiskAssessment {
        let mut metrics = MetricsSnapshot::new();
        for role in self.metrics_order() {
            let Some(report) = state.report(role).filter(|r| !r.fallback) else {
                continue;
            };
            let block = extract(&report.text, METRICS_BLOCK);
            if !block.is_empty() {
                debug!(role = %role, fields = block.len(), "Metrics block found");
                metrics.fill_missing(&block);
            }
        }

        let sector = self
            .config
            .sector
            .clone()
            .or_else(|| metrics.text("SECTOR").map(str::to_string));
        let assessment = evaluate(&metrics, sector.as_deref());

        state.risk = RiskState {
            metrics,
            sector,
            assessment: Some(assessment.clone()),
        };
        assessment
    }

    async fn run_debate(
        &self,
        prompts: &RunPrompts<'_>,
        state: &mut RunState,
        risk_summary: &str,
        ctx: &RunContext,
    ) {
        for role in [Role::BullResearcher, Role::BearResearcher, Role::ResearchManager] {
            state.record_prompt_version(role, prompts.system(role).version);
        }

        let outcome = DebateStage::new(
            &self.runtime,
            prompts,
            self.config.max_debate_rounds,
            self.analyst_views(state),
        )
        .with_risk_summary(risk_summary)
        .run(ctx)
        .await;

        for worker in &outcome.workers {
            state.absorb(worker);
        }
        for role in [Role::BullResearcher, Role::BearResearcher] {
            if let Some(last) = outcome.last_of(role) {
                let _ = state.write_report(role, Report::from_outcome(last));
            }
        }
        state.merge(&outcome.judge);
        state.debate = outcome.debate;
    }

    /// Trader draft, review loop and final decision
    async fn synthesize(
        &self,
        prompts: &RunPrompts<'_>,
        state: &mut RunState,
        risk_summary: &str,
        ctx: &RunContext,
    ) -> (Option<RevisionSummary>, TradeDecision, String) {
        for role in [Role::Trader, Role::RiskReviewer, Role::PortfolioManager] {
            state.record_prompt_version(role, prompts.system(role).version);
        }

        let briefing = prompts.briefing(
            TRADER_TASK,
            json!({
                "reports": self.analyst_views(state),
                "risk_summary": risk_summary,
                "investment_plan": state
                    .report(Role::ResearchManager)
                    .filter(|r| !r.fallback)
                    .map(|r| r.text.as_str()),
            }),
        );
        let draft = self.run_worker(Role::Trader, prompts, briefing, ctx).await;
        state.absorb(&draft);

        let (revision, plan) = if draft.is_fallback() {
            warn!("Trader produced no draft; skipping review");
            let _ = state.write_report(Role::Trader, Report::from_outcome(&draft));
            (None, draft.report.clone())
        } else {
            let outcome = RevisionController::new(&self.runtime, prompts, self.config.max_revisions)
                .with_risk_summary(risk_summary)
                .run(draft.report.clone(), ctx)
                .await;

            for worker in &outcome.workers {
                state.absorb(worker);
            }
            let _ = state.write_report(Role::Trader, Report::new(outcome.draft.clone()));
            if let Some(review) = outcome
                .workers
                .iter()
                .rev()
                .find(|w| w.role == Role::RiskReviewer)
            {
                let _ = state.write_report(Role::RiskReviewer, Report::from_outcome(review));
            }

            (Some(RevisionSummary::from(&outcome)), outcome.annotated_draft())
        };

        let briefing = prompts.briefing(
            DECISION_TASK,
            json!({
                "risk_summary": risk_summary,
                "draft": plan,
                "revisions": revision.map_or(0, |r| r.revisions),
                "review_verdict": revision
                    .map_or_else(|| "skipped".to_string(), |r| r.last_verdict.to_string()),
            }),
        );
        let final_outcome = self
            .run_worker(Role::PortfolioManager, prompts, briefing, ctx)
            .await;
        state.merge(&final_outcome);

        let decision = if final_outcome.is_fallback() {
            TradeDecision {
                action: TradeAction::Hold,
                rationale: final_outcome.report.clone(),
                source: ParseSource::Default,
            }
        } else {
            parse_decision(&final_outcome.report)
        };

        (revision, decision, final_outcome.report)
    }

    async fn run_worker(
        &self,
        role: Role,
        prompts: &RunPrompts<'_>,
        briefing: String,
        ctx: &RunContext,
    ) -> WorkerOutcome {
        self.runtime
            .create_worker(role, prompts.system(role).text, vec![Message::user(briefing)])
            .run(ctx)
            .await
    }

    /// Analyst reports that are not placeholders, in configured order
    fn analyst_views(&self, state: &RunState) -> Value {
        report_views(self.config.analysts.iter().filter_map(|role| {
            state
                .report(*role)
                .filter(|r| !r.fallback)
                .map(|r| (*role, r.text.as_str()))
        }))
    }

    /// Terminal outcome when no analyst produced anything
    fn degraded(&self, state: RunState, ctx: &RunContext) -> RunOutcome {
        let mut diagnostic = format!(
            "No analyst produced a report for {} on {}; no decision was made.\n",
            state.ticker(),
            state.trade_date()
        );
        for role in &self.config.analysts {
            let line = state
                .report_text(*role)
                .unwrap_or("[no report slot written]");
            diagnostic.push_str(&format!("\n- {role}: {line}"));
        }
        warn!(run_id = ctx.run_id(), "Every analyst failed; returning diagnostic report");

        RunOutcome {
            run_id: ctx.run_id().to_string(),
            status: RunStatus::Degraded,
            decision: TradeDecision {
                action: TradeAction::Hold,
                rationale: diagnostic.clone(),
                source: ParseSource::Default,
            },
            final_report: diagnostic,
            revision: None,
            state,
            calls: ctx.finalize(),
        }
    }
}

/// Builder for Orchestrator
pub struct OrchestratorBuilder {
    generator: Option<Arc<dyn Generator>>,
    tool_registry: Arc<ToolRegistry>,
    role_tools: Vec<(Role, Vec<String>)>,
    config: RunConfig,
    catalog: Option<PromptCatalog>,
}

impl OrchestratorBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            generator: None,
            tool_registry: Arc::new(ToolRegistry::default()),
            role_tools: Vec::new(),
            config: RunConfig::default(),
            catalog: None,
        }
    }

    /// Set the generative backend
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the tool registry shared by every worker
    pub fn tool_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.tool_registry = registry;
        self
    }

    /// Restrict a role to the named tools
    pub fn role_tools<I, S>(mut self, role: Role, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_tools
            .push((role, names.into_iter().map(Into::into).collect()));
        self
    }

    /// Set the run configuration
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default prompt catalog
    pub fn prompts(mut self, catalog: PromptCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Build the orchestrator
    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;

        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => default_catalog()?,
        };
        for name in Role::ALL.iter().map(Role::as_str).chain(TASKS) {
            if !catalog.contains(name) {
                return Err(WorkflowError::MissingPrompt(name.to_string()));
            }
        }

        let generator = self
            .generator
            .ok_or_else(|| Error::InitializationFailed("Generator not set".to_string()))?;

        let mut runtime = WorkerRuntime::builder()
            .generator(generator)
            .tool_registry(self.tool_registry)
            .call_policy(self.config.call_policy())
            .config(self.config.worker_config())
            .max_tool_requests_per_turn(self.config.max_tool_requests_per_turn)
            .requests_per_minute(self.config.requests_per_minute);
        for (role, names) in self.role_tools {
            runtime = runtime.role_tools(role, names);
        }

        Ok(Orchestrator {
            runtime: runtime.build()?,
            catalog,
            config: self.config,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
