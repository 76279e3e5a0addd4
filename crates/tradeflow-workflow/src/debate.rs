//! Bull/bear debate and research manager judgement

use crate::prompts::{DEBATE_TASK, JUDGE_TASK, RunPrompts};
use crate::state::DebateState;
use serde_json::{Value, json};
use tracing::info;
use tradeflow_core::{Message, Role, RunContext};
use tradeflow_runtime::{WorkerOutcome, WorkerRuntime};

/// Everything the debate stage produced
#[derive(Debug, Clone)]
pub struct DebateOutcome {
    pub debate: DebateState,
    /// Bull and bear workers, round by round
    pub workers: Vec<WorkerOutcome>,
    pub judge: WorkerOutcome,
}

impl DebateOutcome {
    /// The last worker run for `role` in this stage
    pub fn last_of(&self, role: Role) -> Option<&WorkerOutcome> {
        if role == Role::ResearchManager {
            return Some(&self.judge);
        }
        self.workers.iter().rev().find(|w| w.role == role)
    }
}

/// Runs `rounds` bull/bear rounds followed by the judgement
pub struct DebateStage<'a> {
    runtime: &'a WorkerRuntime,
    prompts: &'a RunPrompts<'a>,
    rounds: usize,
    reports: Value,
    risk_summary: Option<String>,
}

impl<'a> DebateStage<'a> {
    /// `reports` is the list built by [`report_views`](crate::prompts::report_views)
    pub fn new(
        runtime: &'a WorkerRuntime,
        prompts: &'a RunPrompts<'a>,
        rounds: usize,
        reports: Value,
    ) -> Self {
        Self {
            runtime,
            prompts,
            rounds,
            reports,
            risk_summary: None,
        }
    }

    pub fn with_risk_summary(mut self, summary: impl Into<String>) -> Self {
        self.risk_summary = Some(summary.into());
        self
    }

    pub async fn run(&self, ctx: &RunContext) -> DebateOutcome {
        let mut debate = DebateState::default();
        let mut workers = Vec::with_capacity(self.rounds * 2);

        for round in 1..=self.rounds {
            // both sides see the transcript as of the previous round
            let briefing = self.prompts.briefing(
                DEBATE_TASK,
                json!({
                    "round": round,
                    "reports": self.reports,
                    "risk_summary": self.risk_summary,
                    "history": debate.history,
                }),
            );

            let bull = self.worker(Role::BullResearcher, &briefing);
            let bear = self.worker(Role::BearResearcher, &briefing);
            let (bull, bear) = tokio::join!(bull.run(ctx), bear.run(ctx));

            debate.record_round(&bull.report, &bear.report);
            info!(
                round,
                bull_fallback = bull.is_fallback(),
                bear_fallback = bear.is_fallback(),
                "Debate round finished"
            );
            workers.push(bull);
            workers.push(bear);
        }

        let briefing = self.prompts.briefing(
            JUDGE_TASK,
            json!({
                "reports": self.reports,
                "risk_summary": self.risk_summary,
                "history": debate.history,
            }),
        );
        let judge = self.worker(Role::ResearchManager, &briefing).run(ctx).await;
        debate.judge_decision = Some(judge.report.clone());
        info!(rounds = debate.round, fallback = judge.is_fallback(), "Debate judged");

        DebateOutcome {
            debate,
            workers,
            judge,
        }
    }

    fn worker(&self, role: Role, briefing: &str) -> tradeflow_runtime::WorkerTask {
        self.runtime.create_worker(
            role,
            self.prompts.system(role).text,
            vec![Message::user(briefing)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::{default_catalog, report_views};
    use chrono::NaiveDate;
    use std::sync::Arc;
    use tradeflow_llm::{CallPolicy, Generation, ScriptedGenerator};

    async fn debate(generator: Arc<ScriptedGenerator>, rounds: usize) -> DebateOutcome {
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let catalog = default_catalog().unwrap();
        let prompts = RunPrompts::new(&catalog, "AAPL", date);
        let runtime = WorkerRuntime::builder()
            .generator(generator)
            .call_policy(CallPolicy::fast())
            .max_iterations(2)
            .build()
            .unwrap();

        DebateStage::new(
            &runtime,
            &prompts,
            rounds,
            report_views([(Role::MarketAnalyst, "Uptrend.")]),
        )
        .run(&RunContext::new("AAPL", date))
        .await
    }

    #[tokio::test]
    async fn test_rounds_alternate_and_judge_runs_last() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .with_replies(
                    Role::BullResearcher,
                    [Generation::text("Services grow."), Generation::text("Buybacks.")],
                )
                .with_replies(
                    Role::BearResearcher,
                    [Generation::text("China risk."), Generation::text("Antitrust.")],
                )
                .with_reply(Role::ResearchManager, Generation::text("Bull wins. Buy.")),
        );

        let outcome = debate(generator.clone(), 2).await;

        assert_eq!(outcome.debate.round, 2);
        assert_eq!(outcome.debate.bull_rounds, vec!["Services grow.", "Buybacks."]);
        assert_eq!(outcome.debate.bear_rounds, vec!["China risk.", "Antitrust."]);
        assert_eq!(outcome.debate.judge_decision.as_deref(), Some("Bull wins. Buy."));
        assert_eq!(outcome.workers.len(), 4);
        assert_eq!(outcome.last_of(Role::BearResearcher).unwrap().report, "Antitrust.");

        let last_call = generator.calls().last().map(|c| c.role);
        assert_eq!(last_call, Some(Role::ResearchManager));
    }

    #[tokio::test]
    async fn test_failed_side_keeps_debate_going() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .with_role_fallback(Role::BullResearcher, Generation::text("Services grow."))
                .with_role_fallback(Role::ResearchManager, Generation::text("Hold.")),
        );

        let outcome = debate(generator, 1).await;

        let bear = outcome.last_of(Role::BearResearcher).unwrap();
        assert!(bear.is_fallback());
        assert!(outcome.debate.history.contains("Bear (round 1): [bear_researcher report unavailable"));
        assert_eq!(outcome.debate.judge_decision.as_deref(), Some("Hold."));
    }

    #[tokio::test]
    async fn test_zero_rounds_still_judges() {
        let generator =
            Arc::new(ScriptedGenerator::new().with_fallback(Generation::text("No debate held.")));

        let outcome = debate(generator.clone(), 0).await;

        assert!(outcome.debate.is_empty());
        assert!(outcome.workers.is_empty());
        assert_eq!(generator.call_count(Role::ResearchManager), 1);
        assert_eq!(generator.call_count(Role::BullResearcher), 0);
    }
}
