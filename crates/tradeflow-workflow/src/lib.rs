//! Run orchestration for tradeflow
//!
//! An [`Orchestrator`] takes one ticker and trade date through the whole
//! analysis: a parallel analyst group, a deterministic risk gate, an
//! optional bull/bear debate, a bounded review/revise loop over the trading
//! plan, and the portfolio manager's final call. Every run ends in a
//! [`RunOutcome`]; failures along the way degrade to placeholders.

pub mod config;
pub mod debate;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod prompts;
pub mod revision;
pub mod state;
pub mod verdict;

// Re-export for convenience
pub use config::{RunConfig, RunConfigBuilder};
pub use debate::{DebateOutcome, DebateStage};
pub use error::{Result, WorkflowError};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use outcome::{RevisionSummary, RunOutcome, RunStatus};
pub use revision::{RevisionController, RevisionOutcome, RevisionState};
pub use state::{DebateState, Report, RiskState, RunState};
pub use verdict::{
    ParseSource, Review, ReviewVerdict, TradeAction, TradeDecision, parse_decision, parse_review,
};
