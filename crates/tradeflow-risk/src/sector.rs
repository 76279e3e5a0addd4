//! Sector threshold profiles
//!
//! A default profile plus named overrides. Sector names coming from config
//! or from a worker's `SECTOR` field resolve to a profile through keyword
//! tables in English and Chinese. English keywords match whole words
//! (with an optional plural `s`); Chinese keywords match anywhere.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Named threshold profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorProfile {
    #[default]
    Default,
    /// Utilities, telecom, infrastructure, real estate
    CapitalIntensive,
    /// Deposit-taking institutions
    Bank,
    Insurance,
    /// Commodity and cycle-driven industries
    Cyclical,
}

/// Keywords for sector resolution, checked in table order
mod keywords {
    pub const BANK: &[&str] = &[
        "bank",
        "banking",
        "deposit",
        "lender",
        "银行",
        "商业银行",
    ];

    pub const INSURANCE: &[&str] = &[
        "insurance",
        "insurer",
        "reinsurance",
        "保险",
    ];

    pub const CAPITAL_INTENSIVE: &[&str] = &[
        "capital_intensive",
        "capital intensive",
        "utility",
        "utilities",
        "telecom",
        "infrastructure",
        "real estate",
        "property",
        "airline",
        "railway",
        "power",
        "公用事业",
        "电力",
        "通信",
        "基建",
        "房地产",
        "交通运输",
    ];

    pub const CYCLICAL: &[&str] = &[
        "cyclical",
        "steel",
        "mining",
        "metals",
        "chemical",
        "coal",
        "shipping",
        "oil",
        "semiconductor",
        "钢铁",
        "煤炭",
        "有色",
        "化工",
        "航运",
        "采矿",
        "石油",
        "周期",
    ];
}

/// One matcher per profile, in resolution order
static MATCHERS: LazyLock<Vec<(SectorProfile, Regex)>> = LazyLock::new(|| {
    [
        (SectorProfile::Bank, keywords::BANK),
        (SectorProfile::Insurance, keywords::INSURANCE),
        (SectorProfile::CapitalIntensive, keywords::CAPITAL_INTENSIVE),
        (SectorProfile::Cyclical, keywords::CYCLICAL),
    ]
    .into_iter()
    .map(|(profile, words)| (profile, keyword_pattern(words)))
    .collect()
});

fn keyword_pattern(words: &[&str]) -> Regex {
    let alternatives: Vec<String> = words
        .iter()
        .map(|word| {
            if word.is_ascii() {
                format!(r"\b{}s?\b", regex::escape(word))
            } else {
                regex::escape(word)
            }
        })
        .collect();
    Regex::new(&alternatives.join("|")).expect("valid pattern")
}

impl SectorProfile {
    /// Resolve a free-text sector name; unknown names use the default profile
    pub fn resolve(sector: &str) -> Self {
        let sector = sector.trim().to_lowercase();
        if sector.is_empty() {
            return Self::Default;
        }

        MATCHERS
            .iter()
            .find(|(_, pattern)| pattern.is_match(&sector))
            .map_or(Self::Default, |(profile, _)| *profile)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::CapitalIntensive => "capital_intensive",
            Self::Bank => "bank",
            Self::Insurance => "insurance",
            Self::Cyclical => "cyclical",
        }
    }

    /// Thresholds for this profile
    pub fn thresholds(&self) -> Thresholds {
        let base = Thresholds::default();
        match self {
            Self::Default => base,
            Self::CapitalIntensive => Thresholds {
                max_debt_ratio: 80.0,
                min_interest_coverage: 1.5,
                coverage_leverage_floor: 65.0,
                fragile_debt_ratio: 75.0,
                ..base
            },
            Self::Bank | Self::Insurance => Thresholds {
                leverage_checks: false,
                ..base
            },
            Self::Cyclical => Thresholds {
                cyclical_peak_premium: 0.3,
                ..base
            },
        }
    }
}

impl fmt::Display for SectorProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule thresholds
///
/// Ratios reported as percentages (`DEBT_RATIO`, `ROE`, `NET_MARGIN`,
/// `PAYOUT_RATIO`, `CORE_SEGMENT_GROWTH`) are compared in percent units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Run rules that read `DEBT_RATIO`
    pub leverage_checks: bool,
    pub max_debt_ratio: f64,
    pub divergence_multiple: f64,
    pub extreme_divergence_multiple: f64,
    pub min_interest_coverage: f64,
    pub coverage_leverage_floor: f64,
    pub min_roe: f64,
    pub min_cash_conversion: f64,
    pub pe_floor: f64,
    pub pb_floor: f64,
    pub cyclical_peak_premium: f64,
    pub segment_decline_threshold: f64,
    pub fragile_net_margin: f64,
    pub fragile_pb: f64,
    pub fragile_debt_ratio: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            leverage_checks: true,
            max_debt_ratio: 70.0,
            divergence_multiple: 2.0,
            extreme_divergence_multiple: 4.0,
            min_interest_coverage: 2.0,
            coverage_leverage_floor: 50.0,
            min_roe: 8.0,
            min_cash_conversion: 0.5,
            pe_floor: 1.0,
            pb_floor: 0.1,
            cyclical_peak_premium: 0.5,
            segment_decline_threshold: -10.0,
            fragile_net_margin: 5.0,
            fragile_pb: 5.0,
            fragile_debt_ratio: 60.0,
        }
    }
}
