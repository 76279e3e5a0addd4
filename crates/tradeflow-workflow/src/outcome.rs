//! Terminal artifact of a run

use crate::revision::RevisionOutcome;
use crate::state::RunState;
use crate::verdict::{ReviewVerdict, TradeDecision};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tradeflow_core::CallSummary;

/// How far a run got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Gate passed; debate and synthesis ran
    Completed,
    /// Gate rejected; the debate was skipped
    DebateSkipped,
    /// No analyst produced a report; only a diagnostic was written
    Degraded,
}

/// Review cycle counts kept in the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSummary {
    pub revisions: usize,
    pub reviews: usize,
    pub approved: bool,
    pub last_verdict: ReviewVerdict,
}

impl From<&RevisionOutcome> for RevisionSummary {
    fn from(outcome: &RevisionOutcome) -> Self {
        Self {
            revisions: outcome.revisions,
            reviews: outcome.reviews,
            approved: outcome.approved,
            last_verdict: outcome.last_review.verdict,
        }
    }
}

/// What every run returns, whatever failed along the way
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub decision: TradeDecision,
    /// Portfolio manager report, or the diagnostic of a degraded run
    pub final_report: String,
    /// Absent when no draft reached review
    pub revision: Option<RevisionSummary>,
    pub state: RunState,
    pub calls: CallSummary,
}

impl RunOutcome {
    pub fn is_degraded(&self) -> bool {
        self.status == RunStatus::Degraded
    }

    /// Plain-text summary for terminals and logs
    pub fn render_text(&self) -> String {
        let state = &self.state;
        let mut out = format!(
            "Run {} for {} on {}\nStatus: {:?}\nDecision: {} ({:?})\n",
            self.run_id,
            state.ticker(),
            state.trade_date(),
            self.status,
            self.decision.action,
            self.decision.source,
        );

        if let Some(assessment) = &state.risk.assessment {
            let _ = writeln!(out, "\n{}", assessment.summary());
        }

        out.push_str("\nReports:\n");
        for (role, report) in state.reports() {
            let marker = if report.fallback { "fallback" } else { "ok" };
            let _ = writeln!(out, "  {role}: {marker}");
        }

        if let Some(revision) = &self.revision {
            let _ = writeln!(
                out,
                "\nRevisions: {}, reviews: {}, final review {}",
                revision.revisions, revision.reviews, revision.last_verdict
            );
        }

        let totals = &self.calls.totals;
        let _ = writeln!(
            out,
            "\nCalls: {} generations ({} forced, {} retries, {} failed), {} tool calls ({} errors, {} skipped), {} ms",
            totals.generations,
            totals.forced_generations,
            totals.retries,
            totals.failed_generations,
            totals.tool_calls,
            totals.tool_errors,
            totals.skipped_tool_requests,
            self.calls.duration_ms,
        );

        let _ = write!(out, "\n{}\n", self.final_report.trim_end());
        out
    }
}
