//! Deterministic risk gate for tradeflow
//!
//! Workers report financial metrics inside a delimited block in their free
//! text. [`extract`] pulls the last such block into a [`MetricsSnapshot`];
//! [`evaluate`] runs sector-aware threshold rules over it and returns a
//! severity-ranked flag list, a PASS/REJECT [`Verdict`] and a risk tally.
//!
//! ```
//! use tradeflow_risk::{Verdict, evaluate, extract};
//!
//! let report = "\
//! === METRICS_START ===
//! DEBT_RATIO: 85%
//! === METRICS_END ===";
//!
//! let assessment = evaluate(&extract(report, "METRICS"), Some("Consumer Staples"));
//! assert_eq!(assessment.verdict, Verdict::Reject);
//! ```

pub mod blocks;
pub mod engine;
pub mod metrics;
pub mod rules;
pub mod sector;

pub use blocks::extract;
pub use engine::{RiskAssessment, Verdict, evaluate, evaluate_with_profile};
pub use metrics::{MetricValue, MetricsSnapshot};
pub use rules::{FlagAction, FlagKind, RiskFlag, Severity};
pub use sector::{SectorProfile, Thresholds};

/// Block name carrying the gate's metrics
pub const METRICS_BLOCK: &str = "METRICS";
