//! Analyst roles
//!
//! Every worker in a run acts under exactly one [`Role`]. The role is the
//! identity used to tag messages and tool results, and it names the report
//! slot the worker owns in the run state.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named analyst/worker identity with a disjoint write target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Price action and technical indicators
    MarketAnalyst,
    /// Financial statements and valuation; emits the metrics block
    FundamentalsAnalyst,
    /// News flow and company events
    NewsAnalyst,
    /// Social media and investor sentiment
    SentimentAnalyst,
    /// Argues the long case during the debate
    BullResearcher,
    /// Argues the short case during the debate
    BearResearcher,
    /// Judges the debate and writes the investment plan
    ResearchManager,
    /// Drafts the trading plan
    Trader,
    /// Reviews the trading plan draft
    RiskReviewer,
    /// Issues the final decision
    PortfolioManager,
}

impl Role {
    /// Every role, in pipeline order
    pub const ALL: [Role; 10] = [
        Role::MarketAnalyst,
        Role::FundamentalsAnalyst,
        Role::NewsAnalyst,
        Role::SentimentAnalyst,
        Role::BullResearcher,
        Role::BearResearcher,
        Role::ResearchManager,
        Role::Trader,
        Role::RiskReviewer,
        Role::PortfolioManager,
    ];

    /// The default analyst fan-out group
    pub const ANALYSTS: [Role; 4] = [
        Role::MarketAnalyst,
        Role::FundamentalsAnalyst,
        Role::NewsAnalyst,
        Role::SentimentAnalyst,
    ];

    /// Stable snake_case identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketAnalyst => "market_analyst",
            Self::FundamentalsAnalyst => "fundamentals_analyst",
            Self::NewsAnalyst => "news_analyst",
            Self::SentimentAnalyst => "sentiment_analyst",
            Self::BullResearcher => "bull_researcher",
            Self::BearResearcher => "bear_researcher",
            Self::ResearchManager => "research_manager",
            Self::Trader => "trader",
            Self::RiskReviewer => "risk_reviewer",
            Self::PortfolioManager => "portfolio_manager",
        }
    }

    /// Name of the report field this role owns
    pub fn report_field(&self) -> &'static str {
        match self {
            Self::MarketAnalyst => "market_report",
            Self::FundamentalsAnalyst => "fundamentals_report",
            Self::NewsAnalyst => "news_report",
            Self::SentimentAnalyst => "sentiment_report",
            Self::BullResearcher => "bull_case",
            Self::BearResearcher => "bear_case",
            Self::ResearchManager => "investment_plan",
            Self::Trader => "trading_plan",
            Self::RiskReviewer => "risk_review",
            Self::PortfolioManager => "final_decision",
        }
    }

    /// Human readable title
    pub fn title(&self) -> &'static str {
        match self {
            Self::MarketAnalyst => "Market Analyst",
            Self::FundamentalsAnalyst => "Fundamentals Analyst",
            Self::NewsAnalyst => "News Analyst",
            Self::SentimentAnalyst => "Sentiment Analyst",
            Self::BullResearcher => "Bull Researcher",
            Self::BearResearcher => "Bear Researcher",
            Self::ResearchManager => "Research Manager",
            Self::Trader => "Trader",
            Self::RiskReviewer => "Risk Reviewer",
            Self::PortfolioManager => "Portfolio Manager",
        }
    }

    /// Whether this role belongs to the analyst stage
    pub fn is_analyst(&self) -> bool {
        Self::ANALYSTS.contains(self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    /// Accepts the snake_case id, the short analyst name (`market`) or the
    /// report field name (`market_report`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace(['-', ' '], "_");
        Role::ALL
            .into_iter()
            .find(|role| {
                role.as_str() == key
                    || role.report_field() == key
                    || role.as_str().strip_suffix("_analyst") == Some(key.as_str())
            })
            .ok_or_else(|| Error::UnknownRole(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_names() {
        assert_eq!("market".parse::<Role>().unwrap(), Role::MarketAnalyst);
        assert_eq!("News-Analyst".parse::<Role>().unwrap(), Role::NewsAnalyst);
        assert_eq!("trading_plan".parse::<Role>().unwrap(), Role::Trader);
        assert!("astrologer".parse::<Role>().is_err());
    }

    #[test]
    fn test_report_fields_are_disjoint() {
        let mut fields: Vec<_> = Role::ALL.iter().map(Role::report_field).collect();
        fields.sort_unstable();
        fields.dedup();
        assert_eq!(fields.len(), Role::ALL.len());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&Role::RiskReviewer).unwrap();
        assert_eq!(json, "\"risk_reviewer\"");
        assert!(Role::SentimentAnalyst.is_analyst());
        assert!(!Role::Trader.is_analyst());
    }
}
