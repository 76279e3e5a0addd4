//! Threshold rules
//!
//! Each rule reads a [`MetricsSnapshot`] and may raise one [`RiskFlag`].
//! Rules are independent; a missing metric never triggers a rule and every
//! comparison against a threshold is strict.

use crate::metrics::MetricsSnapshot;
use crate::sector::Thresholds;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a flag is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagKind {
    HighLeverage,
    IncomeCashFlowDisconnect,
    WeakCoverageWithLeverage,
    UnsustainableDistribution,
    SuspiciousCashConversion,
    UnreliableValuation,
    CyclicalPeak,
    SegmentDeterioration,
    FragileValuation,
}

impl FlagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighLeverage => "HIGH_LEVERAGE",
            Self::IncomeCashFlowDisconnect => "INCOME_CASH_FLOW_DISCONNECT",
            Self::WeakCoverageWithLeverage => "WEAK_COVERAGE_WITH_LEVERAGE",
            Self::UnsustainableDistribution => "UNSUSTAINABLE_DISTRIBUTION",
            Self::SuspiciousCashConversion => "SUSPICIOUS_CASH_CONVERSION",
            Self::UnreliableValuation => "UNRELIABLE_VALUATION",
            Self::CyclicalPeak => "CYCLICAL_PEAK",
            Self::SegmentDeterioration => "SEGMENT_DETERIORATION",
            Self::FragileValuation => "FRAGILE_VALUATION",
        }
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Critical,
}

/// What the gate does with a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagAction {
    /// Rejects the candidate outright when the flag is critical
    AutoReject,
    /// Adds `risk_penalty` to the run's risk tally
    RiskPenalty,
}

/// One raised risk flag; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFlag {
    pub kind: FlagKind,
    pub severity: Severity,
    pub detail: String,
    pub action: FlagAction,
    pub risk_penalty: f64,
}

impl RiskFlag {
    fn reject(kind: FlagKind, detail: String) -> Self {
        Self {
            kind,
            severity: Severity::Critical,
            detail,
            action: FlagAction::AutoReject,
            risk_penalty: 0.0,
        }
    }

    fn penalty(kind: FlagKind, severity: Severity, risk_penalty: f64, detail: String) -> Self {
        Self {
            kind,
            severity,
            detail,
            action: FlagAction::RiskPenalty,
            risk_penalty,
        }
    }

    pub fn is_auto_reject(&self) -> bool {
        self.severity == Severity::Critical && self.action == FlagAction::AutoReject
    }
}

pub(crate) type Rule = fn(&MetricsSnapshot, &Thresholds) -> Option<RiskFlag>;

/// Rules in evaluation order
pub(crate) const RULES: &[Rule] = &[
    high_leverage,
    income_cash_flow_disconnect,
    weak_coverage_with_leverage,
    unsustainable_distribution,
    suspicious_cash_conversion,
    unreliable_valuation,
    cyclical_peak,
    segment_deterioration,
    fragile_valuation,
];

/// Labels that describe an unstable or deteriorating profit history
const UNSTABLE_LABELS: &[&str] = &[
    "volatile",
    "unstable",
    "declining",
    "deteriorating",
    "cyclical",
    "erratic",
    "波动",
    "不稳定",
    "下滑",
    "下降",
    "恶化",
];

/// Labels that describe an improving trend
const IMPROVING_LABELS: &[&str] = &[
    "improving",
    "rising",
    "recovering",
    "increasing",
    "upward",
    "改善",
    "上升",
    "回升",
    "增长",
];

fn label_matches(label: &str, table: &[&str]) -> bool {
    let label = label.to_lowercase();
    table.iter().any(|w| label.contains(w))
}

fn high_leverage(m: &MetricsSnapshot, t: &Thresholds) -> Option<RiskFlag> {
    if !t.leverage_checks {
        return None;
    }
    let debt = m.number("DEBT_RATIO")?;
    (debt > t.max_debt_ratio).then(|| {
        RiskFlag::reject(
            FlagKind::HighLeverage,
            format!("Debt ratio {debt:.1}% exceeds {:.1}%", t.max_debt_ratio),
        )
    })
}

fn income_cash_flow_disconnect(m: &MetricsSnapshot, t: &Thresholds) -> Option<RiskFlag> {
    let income = m.number("NET_INCOME")?;
    let cash_flow = m.number("OPERATING_CASH_FLOW")?;
    if income <= 0.0 || cash_flow >= 0.0 {
        return None;
    }

    let divergence = cash_flow.abs() / income;
    if divergence > t.extreme_divergence_multiple {
        Some(RiskFlag::penalty(
            FlagKind::IncomeCashFlowDisconnect,
            Severity::Warning,
            0.15,
            format!(
                "Operating cash outflow is {divergence:.1}x net income; beyond {:.1}x this is \
                 more likely a data-quality problem than an earnings problem",
                t.extreme_divergence_multiple
            ),
        ))
    } else if divergence > t.divergence_multiple {
        Some(RiskFlag::reject(
            FlagKind::IncomeCashFlowDisconnect,
            format!(
                "Net income {income:.0} with operating cash flow {cash_flow:.0} \
                 ({divergence:.1}x divergence, limit {:.1}x)",
                t.divergence_multiple
            ),
        ))
    } else {
        None
    }
}

fn weak_coverage_with_leverage(m: &MetricsSnapshot, t: &Thresholds) -> Option<RiskFlag> {
    if !t.leverage_checks {
        return None;
    }
    let coverage = m.number("INTEREST_COVERAGE")?;
    let debt = m.number("DEBT_RATIO")?;
    (coverage < t.min_interest_coverage && debt > t.coverage_leverage_floor).then(|| {
        RiskFlag::reject(
            FlagKind::WeakCoverageWithLeverage,
            format!(
                "Interest coverage {coverage:.2}x below {:.2}x with debt ratio {debt:.1}%",
                t.min_interest_coverage
            ),
        )
    })
}

fn unsustainable_distribution(m: &MetricsSnapshot, t: &Thresholds) -> Option<RiskFlag> {
    let payout = m.number("PAYOUT_RATIO")?;
    let free_cash_flow = m.number("FREE_CASH_FLOW")?;
    let dividends = m.number("DIVIDENDS_PAID")?;
    if payout <= 100.0 || free_cash_flow >= dividends {
        return None;
    }

    let weak_returns = m.number("ROE").is_some_and(|roe| roe < t.min_roe);
    let trend = m.text("PROFIT_TREND").or_else(|| m.text("ROE_TREND"));
    let non_improving = trend.is_some_and(|label| !label_matches(label, IMPROVING_LABELS));

    let detail = format!(
        "Payout ratio {payout:.0}% with free cash flow {free_cash_flow:.0} below dividends {dividends:.0}"
    );

    if weak_returns && non_improving {
        Some(RiskFlag::reject(
            FlagKind::UnsustainableDistribution,
            format!("{detail}; returns weak and trend not improving"),
        ))
    } else {
        Some(RiskFlag::penalty(
            FlagKind::UnsustainableDistribution,
            Severity::Warning,
            0.1,
            detail,
        ))
    }
}

fn suspicious_cash_conversion(m: &MetricsSnapshot, t: &Thresholds) -> Option<RiskFlag> {
    let income = m.number("NET_INCOME")?;
    let cash_flow = m.number("OPERATING_CASH_FLOW")?;
    if income <= 0.0 || cash_flow < 0.0 {
        return None;
    }

    let conversion = cash_flow / income;
    (conversion < t.min_cash_conversion).then(|| {
        RiskFlag::penalty(
            FlagKind::SuspiciousCashConversion,
            Severity::Warning,
            0.1,
            format!(
                "Only {:.0}% of net income converts to operating cash flow",
                conversion * 100.0
            ),
        )
    })
}

fn unreliable_valuation(m: &MetricsSnapshot, t: &Thresholds) -> Option<RiskFlag> {
    let near_zero = |key: &str, floor: f64| {
        m.number(key)
            .filter(|v| *v != 0.0 && v.abs() < floor)
            .map(|v| format!("{key} {v:.2}"))
    };

    let hits: Vec<String> = [
        near_zero("PE_RATIO", t.pe_floor),
        near_zero("PB_RATIO", t.pb_floor),
    ]
    .into_iter()
    .flatten()
    .collect();

    (!hits.is_empty()).then(|| {
        RiskFlag::penalty(
            FlagKind::UnreliableValuation,
            Severity::Warning,
            0.05,
            format!("Valuation ratios too close to zero to be meaningful: {}", hits.join(", ")),
        )
    })
}

fn cyclical_peak(m: &MetricsSnapshot, t: &Thresholds) -> Option<RiskFlag> {
    let roe = m.number("ROE")?;
    let average = m.number("ROE_5Y_AVG")?;
    if average <= 0.0 || roe <= average * (1.0 + t.cyclical_peak_premium) {
        return None;
    }

    let label = m.text("PROFIT_STABILITY").or_else(|| m.text("PROFIT_TREND"))?;
    label_matches(label, UNSTABLE_LABELS).then(|| {
        RiskFlag::penalty(
            FlagKind::CyclicalPeak,
            Severity::Warning,
            0.1,
            format!("ROE {roe:.1}% well above its 5-year average {average:.1}% with profits '{label}'"),
        )
    })
}

fn segment_deterioration(m: &MetricsSnapshot, t: &Thresholds) -> Option<RiskFlag> {
    let growth = m.number("CORE_SEGMENT_GROWTH")?;
    (growth < t.segment_decline_threshold).then(|| {
        RiskFlag::penalty(
            FlagKind::SegmentDeterioration,
            Severity::Warning,
            0.1,
            format!("Core segment revenue growth {growth:.1}%"),
        )
    })
}

fn fragile_valuation(m: &MetricsSnapshot, t: &Thresholds) -> Option<RiskFlag> {
    if !t.leverage_checks {
        return None;
    }
    let margin = m.number("NET_MARGIN")?;
    let pb = m.number("PB_RATIO")?;
    let debt = m.number("DEBT_RATIO")?;
    (margin < t.fragile_net_margin && pb > t.fragile_pb && debt > t.fragile_debt_ratio).then(|| {
        RiskFlag::penalty(
            FlagKind::FragileValuation,
            Severity::Critical,
            0.2,
            format!("Net margin {margin:.1}%, P/B {pb:.1}, debt ratio {debt:.1}%"),
        )
    })
}
