//! Shared run state
//!
//! [`RunState`] is owned by the orchestrator, which is its only writer.
//! Workers never see it directly: they get a seed built from it and hand
//! back a [`WorkerOutcome`] that is merged here.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use tradeflow_core::{Error, Message, Result, Role};
use tradeflow_risk::{MetricsSnapshot, RiskAssessment};
use tradeflow_runtime::WorkerOutcome;

/// Content of one role's report slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub text: String,
    /// The worker failed and `text` is the placeholder
    pub fallback: bool,
}

impl Report {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fallback: false,
        }
    }

    pub fn fallback(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fallback: true,
        }
    }

    pub fn from_outcome(outcome: &WorkerOutcome) -> Self {
        Self {
            text: outcome.report.clone(),
            fallback: outcome.is_fallback(),
        }
    }
}

/// Bull/bear debate record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateState {
    /// Bull argument per completed round
    pub bull_rounds: Vec<String>,
    /// Bear argument per completed round
    pub bear_rounds: Vec<String>,
    /// Transcript of completed rounds, as shown to the next round
    pub history: String,
    /// Completed rounds
    pub round: usize,
    /// Research manager's judgement, once made
    pub judge_decision: Option<String>,
}

impl DebateState {
    /// Append one finished round to the record
    pub fn record_round(&mut self, bull: &str, bear: &str) {
        self.round += 1;
        if !self.history.is_empty() {
            self.history.push_str("\n\n");
        }
        self.history.push_str(&format!(
            "Bull (round {round}): {bull}\n\nBear (round {round}): {bear}",
            round = self.round
        ));
        self.bull_rounds.push(bull.to_string());
        self.bear_rounds.push(bear.to_string());
    }

    /// Whether the debate stage ran at all
    pub fn is_empty(&self) -> bool {
        self.round == 0
    }
}

/// Risk gate record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    /// Merged metrics the gate evaluated
    pub metrics: MetricsSnapshot,
    /// Sector text used to select the threshold profile
    pub sector: Option<String>,
    pub assessment: Option<RiskAssessment>,
}

/// The single mutable record of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    ticker: String,
    trade_date: NaiveDate,
    messages: Vec<Message>,
    reports: BTreeMap<Role, Report>,
    pub debate: DebateState,
    pub risk: RiskState,
    tool_calls: BTreeMap<Role, u32>,
    prompt_versions: BTreeMap<Role, String>,
}

impl RunState {
    pub fn new(ticker: impl Into<String>, trade_date: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            trade_date,
            messages: Vec::new(),
            reports: BTreeMap::new(),
            debate: DebateState::default(),
            risk: RiskState::default(),
            tool_calls: BTreeMap::new(),
            prompt_versions: BTreeMap::new(),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn trade_date(&self) -> NaiveDate {
        self.trade_date
    }

    /// Append-only message log
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn report(&self, role: Role) -> Option<&Report> {
        self.reports.get(&role)
    }

    /// Report text, if the slot was written
    pub fn report_text(&self, role: Role) -> Option<&str> {
        self.reports.get(&role).map(|r| r.text.as_str())
    }

    pub fn reports(&self) -> &BTreeMap<Role, Report> {
        &self.reports
    }

    /// Write a report slot once
    ///
    /// A second write for the same role is refused and logged; the first
    /// report stays in place.
    pub fn write_report(&mut self, role: Role, report: Report) -> Result<()> {
        if self.reports.contains_key(&role) {
            warn!(role = %role, "Refusing to overwrite a written report");
            return Err(Error::ReportAlreadyWritten(role.to_string()));
        }
        debug!(role = %role, fallback = report.fallback, "Report written");
        self.reports.insert(role, report);
        Ok(())
    }

    /// Fold a worker's messages and tool counts into the run
    pub fn absorb(&mut self, outcome: &WorkerOutcome) {
        self.messages.extend(outcome.messages.iter().cloned());
        *self.tool_calls.entry(outcome.role).or_default() += outcome.tool_calls;
    }

    /// Absorb a worker outcome and write its report slot
    pub fn merge(&mut self, outcome: &WorkerOutcome) {
        self.absorb(outcome);
        // a refused write is logged by write_report
        let _ = self.write_report(outcome.role, Report::from_outcome(outcome));
    }

    /// Tool invocations per role
    pub fn tool_calls(&self) -> &BTreeMap<Role, u32> {
        &self.tool_calls
    }

    pub fn record_prompt_version(&mut self, role: Role, version: impl Into<String>) {
        self.prompt_versions.insert(role, version.into());
    }

    /// Prompt template version used per role
    pub fn prompt_versions(&self) -> &BTreeMap<Role, String> {
        &self.prompt_versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeflow_runtime::WorkerState;

    fn state() -> RunState {
        RunState::new("600519", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    }

    fn outcome(role: Role, report: &str, state: WorkerState) -> WorkerOutcome {
        WorkerOutcome {
            role,
            report: report.to_string(),
            state,
            messages: vec![Message::worker(role, report)],
            iterations: 1,
            tool_calls: 2,
        }
    }

    #[test]
    fn test_report_slot_is_write_once() {
        let mut state = state();
        state
            .write_report(Role::NewsAnalyst, Report::new("first"))
            .unwrap();

        let err = state
            .write_report(Role::NewsAnalyst, Report::new("second"))
            .unwrap_err();

        assert!(matches!(err, Error::ReportAlreadyWritten(_)));
        assert_eq!(state.report_text(Role::NewsAnalyst), Some("first"));
    }

    #[test]
    fn test_merge_appends_and_counts() {
        let mut state = state();
        state.merge(&outcome(Role::MarketAnalyst, "Uptrend.", WorkerState::Done));
        state.merge(&outcome(
            Role::NewsAnalyst,
            "[news_analyst report unavailable: timeout]",
            WorkerState::Failed,
        ));
        state.merge(&outcome(Role::MarketAnalyst, "Downtrend.", WorkerState::Done));

        assert_eq!(state.messages().len(), 3);
        assert_eq!(state.report_text(Role::MarketAnalyst), Some("Uptrend."));
        assert!(state.report(Role::NewsAnalyst).unwrap().fallback);
        assert_eq!(state.tool_calls()[&Role::MarketAnalyst], 4);
    }

    #[test]
    fn test_debate_history_accumulates() {
        let mut debate = DebateState::default();
        assert!(debate.is_empty());

        debate.record_round("Margins expand.", "Valuation is stretched.");
        debate.record_round("Buybacks.", "Slowing demand.");

        assert_eq!(debate.round, 2);
        assert_eq!(debate.bear_rounds[1], "Slowing demand.");
        assert!(debate.history.starts_with("Bull (round 1): Margins expand."));
        assert!(debate.history.ends_with("Bear (round 2): Slowing demand."));
    }
}
