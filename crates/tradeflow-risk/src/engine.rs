//! Risk rule engine

use crate::metrics::MetricsSnapshot;
use crate::rules::{FlagAction, RULES, RiskFlag, Severity};
use crate::sector::SectorProfile;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt::{self, Write as _};
use tracing::{debug, info};

/// Aggregate gate verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    #[default]
    Pass,
    Reject,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Reject => "REJECT",
        })
    }
}

/// Result of evaluating one metrics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Raised flags, critical first, rule order within a severity
    pub flags: Vec<RiskFlag>,
    pub verdict: Verdict,
    /// Sum of penalties of `RiskPenalty` flags
    pub risk_tally: f64,
    pub profile: SectorProfile,
}

impl RiskAssessment {
    /// A passing assessment with no flags
    pub fn pass(profile: SectorProfile) -> Self {
        Self {
            flags: Vec::new(),
            verdict: Verdict::Pass,
            risk_tally: 0.0,
            profile,
        }
    }

    pub fn is_reject(&self) -> bool {
        self.verdict == Verdict::Reject
    }

    /// Flags that forced the rejection
    pub fn rejecting_flags(&self) -> impl Iterator<Item = &RiskFlag> {
        self.flags.iter().filter(|f| f.is_auto_reject())
    }

    /// Plain-text summary for downstream prompts
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Risk gate: {} (profile: {}, risk tally: {:.2})",
            self.verdict, self.profile, self.risk_tally
        );
        if self.flags.is_empty() {
            out.push_str("\nNo risk flags raised.");
        }
        for flag in &self.flags {
            let severity = match flag.severity {
                Severity::Critical => "CRITICAL",
                Severity::Warning => "WARNING",
            };
            let _ = write!(out, "\n- [{severity}] {}: {}", flag.kind, flag.detail);
        }
        out
    }
}

/// Evaluate every rule against `metrics` under the sector's profile
///
/// `sector` is free text; see [`SectorProfile::resolve`]. `None` selects the
/// default profile.
pub fn evaluate(metrics: &MetricsSnapshot, sector: Option<&str>) -> RiskAssessment {
    let profile = sector.map_or(SectorProfile::Default, SectorProfile::resolve);
    evaluate_with_profile(metrics, profile)
}

/// Evaluate under an explicit profile
pub fn evaluate_with_profile(metrics: &MetricsSnapshot, profile: SectorProfile) -> RiskAssessment {
    let thresholds = profile.thresholds();

    let mut flags: Vec<RiskFlag> = RULES
        .iter()
        .filter_map(|rule| rule(metrics, &thresholds))
        .collect();
    flags.sort_by_key(|flag| Reverse(flag.severity));

    let verdict = if flags.iter().any(RiskFlag::is_auto_reject) {
        Verdict::Reject
    } else {
        Verdict::Pass
    };

    let risk_tally: f64 = flags
        .iter()
        .filter(|f| f.action == FlagAction::RiskPenalty)
        .map(|f| f.risk_penalty)
        .sum();

    for flag in &flags {
        debug!(kind = %flag.kind, severity = ?flag.severity, detail = %flag.detail, "Risk flag");
    }
    info!(
        %verdict,
        %profile,
        flags = flags.len(),
        risk_tally,
        "Risk gate evaluated"
    );

    RiskAssessment {
        flags,
        verdict,
        risk_tally,
        profile,
    }
}
