//! Per-run accounting context
//!
//! A [`RunContext`] is created when a run starts, shared (behind an `Arc`)
//! with every worker of that run, and finalized into a [`CallSummary`] when
//! the run ends. It replaces any process-wide call tracker: two concurrent
//! runs never share counters.

use crate::Role;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Call counters for a single role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStats {
    /// Generation requests sent to the backend (including retries)
    pub generations: u32,
    /// Generations issued with tools forbidden to force termination
    pub forced_generations: u32,
    /// Retries after a transient failure
    pub retries: u32,
    /// Generation calls that failed after all retries
    pub failed_generations: u32,
    /// Tool requests executed
    pub tool_calls: u32,
    /// Executed tool requests that produced an error result
    pub tool_errors: u32,
    /// Tool requests skipped by the per-turn cap
    pub skipped_tool_requests: u32,
}

impl CallStats {
    fn absorb(&mut self, other: &CallStats) {
        self.generations += other.generations;
        self.forced_generations += other.forced_generations;
        self.retries += other.retries;
        self.failed_generations += other.failed_generations;
        self.tool_calls += other.tool_calls;
        self.tool_errors += other.tool_errors;
        self.skipped_tool_requests += other.skipped_tool_requests;
    }
}

/// Final accounting of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSummary {
    /// Run identifier
    pub run_id: String,
    /// Instrument analysed
    pub ticker: String,
    /// Wall-clock duration in milliseconds
    pub duration_ms: i64,
    /// Counters per role
    pub per_role: BTreeMap<Role, CallStats>,
    /// Sum over all roles
    pub totals: CallStats,
}

/// Explicit context threaded through one analysis run
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    ticker: String,
    trade_date: NaiveDate,
    started_at: DateTime<Utc>,
    stats: Mutex<BTreeMap<Role, CallStats>>,
}

impl RunContext {
    /// Create a context for analysing `ticker` as of `trade_date`
    pub fn new(ticker: impl Into<String>, trade_date: NaiveDate) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            ticker: ticker.into(),
            trade_date,
            started_at: Utc::now(),
            stats: Mutex::new(BTreeMap::new()),
        }
    }

    /// Run identifier
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Instrument analysed
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Analysis date
    pub fn trade_date(&self) -> NaiveDate {
        self.trade_date
    }

    /// When the run started
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn update(&self, role: Role, f: impl FnOnce(&mut CallStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        f(stats.entry(role).or_default());
    }

    /// Record a generation request
    pub fn record_generation(&self, role: Role, forced: bool) {
        self.update(role, |s| {
            s.generations += 1;
            if forced {
                s.forced_generations += 1;
            }
        });
    }

    /// Record a retry after a transient failure
    pub fn record_retry(&self, role: Role) {
        self.update(role, |s| s.retries += 1);
    }

    /// Record a generation that failed after all retries
    pub fn record_failed_generation(&self, role: Role) {
        self.update(role, |s| s.failed_generations += 1);
    }

    /// Record an executed tool request
    pub fn record_tool_call(&self, role: Role, succeeded: bool) {
        self.update(role, |s| {
            s.tool_calls += 1;
            if !succeeded {
                s.tool_errors += 1;
            }
        });
    }

    /// Record tool requests skipped by the per-turn cap
    pub fn record_skipped_tool_requests(&self, role: Role, count: u32) {
        self.update(role, |s| s.skipped_tool_requests += count);
    }

    /// Snapshot of the counters for one role
    pub fn stats(&self, role: Role) -> CallStats {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.get(&role).copied().unwrap_or_default()
    }

    /// Close the run's accounting
    pub fn finalize(&self) -> CallSummary {
        let per_role = self
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut totals = CallStats::default();
        for stats in per_role.values() {
            totals.absorb(stats);
        }

        CallSummary {
            run_id: self.run_id.clone(),
            ticker: self.ticker.clone(),
            duration_ms: (Utc::now() - self.started_at).num_milliseconds(),
            per_role,
            totals,
        }
    }
}
