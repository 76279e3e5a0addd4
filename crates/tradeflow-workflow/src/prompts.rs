//! Default prompt catalog
//!
//! One system prompt per role, named after the role id, plus the stage
//! briefings the orchestrator renders into each worker's first message.

use chrono::NaiveDate;
use serde_json::{Map, Value, json};
use tracing::warn;
use tradeflow_core::Role;
use tradeflow_prompt::{PromptCatalog, PromptTemplate, RenderedPrompt, Result};

/// Version recorded when a prompt had to be replaced by a generic one
pub const UNVERSIONED: &str = "unversioned";

/// Briefing for the analyst fan-out
pub const ANALYST_TASK: &str = "task.analyst";
/// Briefing for one bull/bear round
pub const DEBATE_TASK: &str = "task.debate";
/// Briefing for the research manager's judgement
pub const JUDGE_TASK: &str = "task.judge";
/// Briefing for the trader's first draft
pub const TRADER_TASK: &str = "task.trader";
/// Briefing for one review of the trading plan
pub const REVIEW_TASK: &str = "task.review";
/// Briefing for one revision of the trading plan
pub const REVISE_TASK: &str = "task.revise";
/// Briefing for the final decision
pub const DECISION_TASK: &str = "task.decision";

/// Every briefing the orchestrator renders
pub const TASKS: [&str; 7] = [
    ANALYST_TASK,
    DEBATE_TASK,
    JUDGE_TASK,
    TRADER_TASK,
    REVIEW_TASK,
    REVISE_TASK,
    DECISION_TASK,
];

const REPORTS: &str = "{% for report in reports %}## {{ report.title }}
{{ report.text }}

{% endfor %}";

const RISK: &str = "{% if risk_summary %}{{ risk_summary }}

{% endif %}";

/// Build the catalog with every role prompt and briefing
pub fn default_catalog() -> Result<PromptCatalog> {
    let mut builder = PromptCatalog::builder();
    for role in Role::ALL {
        builder = builder.template(system_prompt(role)?);
    }
    Ok(builder.templates(briefings()?).build())
}

/// System prompt template for one role
pub fn system_prompt(role: Role) -> Result<PromptTemplate> {
    let (version, source) = match role {
        Role::MarketAnalyst => (
            "v1",
            "You are a market analyst covering {{ ticker }}. Study recent price action, \
volume and technical indicators up to {{ trade_date }}. Use the available tools for \
data; never invent prices. Finish with a short table of the signals you relied on.",
        ),
        Role::FundamentalsAnalyst => (
            "v3",
            "You are a fundamentals analyst covering {{ ticker }} as of {{ trade_date }}. \
Review the latest financial statements, profitability, leverage, cash generation and \
valuation.

End your report with a metrics block in exactly this form, one field per line, \
writing N/A for anything you could not establish:

=== METRICS_START ===
SECTOR: <industry>
DEBT_RATIO: <percent>
INTEREST_COVERAGE: <times>
NET_INCOME: <amount>
OPERATING_CASH_FLOW: <amount>
FREE_CASH_FLOW: <amount>
DIVIDENDS_PAID: <amount>
PAYOUT_RATIO: <percent>
ROE: <percent>
ROE_5Y_AVG: <percent>
PROFIT_TREND: <improving|stable|declining|volatile>
PROFIT_STABILITY: <stable|volatile|cyclical>
NET_MARGIN: <percent>
PE_RATIO: <times>
PB_RATIO: <times>
CORE_SEGMENT_GROWTH: <percent>
=== METRICS_END ===

If you correct a figure later, repeat the whole block; only the last block counts.",
        ),
        Role::NewsAnalyst => (
            "v1",
            "You are a news analyst covering {{ ticker }}. Summarize company news, \
announcements and macro events up to {{ trade_date }} that matter for the stock, and \
say which way each one cuts.",
        ),
        Role::SentimentAnalyst => (
            "v1",
            "You are a sentiment analyst covering {{ ticker }}. Gauge investor and social \
media sentiment up to {{ trade_date }}. Separate noise from shifts in positioning.",
        ),
        Role::BullResearcher => (
            "v1",
            "You are the bull researcher for {{ ticker }}. Build the strongest evidence-based \
case for owning the stock and rebut the bear's latest points directly.",
        ),
        Role::BearResearcher => (
            "v1",
            "You are the bear researcher for {{ ticker }}. Build the strongest evidence-based \
case against owning the stock and rebut the bull's latest points directly.",
        ),
        Role::ResearchManager => (
            "v1",
            "You are the research manager for {{ ticker }}. Judge the bull/bear debate on \
the strength of evidence, pick a side, and write an investment plan the trader can act \
on.",
        ),
        Role::Trader => (
            "v1",
            "You are the trader for {{ ticker }}. Turn the research into a concrete trading \
plan: direction, sizing, entry, stop and exit. End with \
'FINAL TRANSACTION PROPOSAL: BUY', 'HOLD' or 'SELL'.",
        ),
        Role::RiskReviewer => (
            "v1",
            "You are the risk reviewer for {{ ticker }}. Check the trading plan against the \
risk findings and the research. Approve it only if the risks are sized and hedged.",
        ),
        Role::PortfolioManager => (
            "v1",
            "You are the portfolio manager. Make the final call on {{ ticker }} for \
{{ trade_date }} from the reviewed trading plan and the risk findings.",
        ),
    };

    PromptTemplate::new(role.as_str(), version, source)
}

/// Renders prompts for one run
///
/// Every template sees `ticker` and `trade_date`. A render failure is logged
/// and replaced by a generic prompt so a run never stops on a template.
#[derive(Debug, Clone)]
pub struct RunPrompts<'a> {
    catalog: &'a PromptCatalog,
    ticker: String,
    base: Map<String, Value>,
}

impl<'a> RunPrompts<'a> {
    pub fn new(catalog: &'a PromptCatalog, ticker: &str, trade_date: NaiveDate) -> Self {
        let mut base = Map::new();
        base.insert("ticker".to_string(), json!(ticker));
        base.insert("trade_date".to_string(), json!(trade_date.to_string()));
        Self {
            catalog,
            ticker: ticker.to_string(),
            base,
        }
    }

    /// System prompt and its version for `role`
    pub fn system(&self, role: Role) -> RenderedPrompt {
        match self.catalog.render(role.as_str(), &self.base) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(role = %role, error = %e, "Using generic system prompt");
                RenderedPrompt {
                    text: format!("You are the {} for {}.", role.title(), self.ticker),
                    version: UNVERSIONED.to_string(),
                }
            }
        }
    }

    /// Render a stage briefing; `vars` must be a JSON object
    pub fn briefing(&self, task: &str, vars: Value) -> String {
        let mut merged = self.base.clone();
        if let Value::Object(extra) = vars {
            merged.extend(extra);
        }

        match self.catalog.render(task, &merged) {
            Ok(rendered) => rendered.text,
            Err(e) => {
                warn!(task, error = %e, "Using generic briefing");
                format!("Continue your work on {}.", self.ticker)
            }
        }
    }
}

/// Report list in the shape the briefings iterate over
pub fn report_views<'r>(reports: impl IntoIterator<Item = (Role, &'r str)>) -> Value {
    Value::Array(
        reports
            .into_iter()
            .map(|(role, text)| json!({ "title": role.title(), "text": text }))
            .collect(),
    )
}

fn briefings() -> Result<Vec<PromptTemplate>> {
    Ok(vec![
        PromptTemplate::new(
            ANALYST_TASK,
            "v1",
            "Analyse {{ ticker }} for the trade date {{ trade_date }} and write your report.",
        )?,
        PromptTemplate::new(
            DEBATE_TASK,
            "v1",
            format!(
                "Debate round {{{{ round }}}} on {{{{ ticker }}}} ({{{{ trade_date }}}}).

{REPORTS}{RISK}{{% if history %}}Debate so far:
{{{{ history }}}}

{{% endif %}}Make your case for this round."
            ),
        )?,
        PromptTemplate::new(
            JUDGE_TASK,
            "v1",
            format!(
                "Judge the debate on {{{{ ticker }}}} ({{{{ trade_date }}}}).

{REPORTS}{RISK}Debate transcript:
{{{{ history }}}}

Decide which side made the stronger case and write the investment plan."
            ),
        )?,
        PromptTemplate::new(
            TRADER_TASK,
            "v1",
            format!(
                "Draft the trading plan for {{{{ ticker }}}} ({{{{ trade_date }}}}).

{REPORTS}{RISK}{{% if investment_plan %}}Investment plan:
{{{{ investment_plan }}}}

{{% else %}}The debate stage was skipped after the risk gate rejected the name.

{{% endif %}}Write the plan."
            ),
        )?,
        PromptTemplate::new(
            REVIEW_TASK,
            "v1",
            format!(
                "Review the trading plan for {{{{ ticker }}}} (review {{{{ review }}}}).

{RISK}Trading plan:
{{{{ draft }}}}

Reply with JSON: {{\"verdict\": \"APPROVED\" or \"REVISE\", \"feedback\": \"...\", \"issues\": [\"...\"]}}"
            ),
        )?,
        PromptTemplate::new(
            REVISE_TASK,
            "v1",
            "Revise your trading plan for {{ ticker }} (revision {{ revision }}).

Current plan:
{{ draft }}

Reviewer feedback:
{{ feedback }}
{% for issue in issues %}- {{ issue }}
{% endfor %}
Return the full revised plan.",
        )?,
        PromptTemplate::new(
            DECISION_TASK,
            "v1",
            format!(
                "Final decision on {{{{ ticker }}}} for {{{{ trade_date }}}}.

{RISK}Trading plan ({{{{ revisions }}}} revision(s), final review {{{{ review_verdict }}}}):
{{{{ draft }}}}

Reply with JSON: {{\"action\": \"BUY\" or \"HOLD\" or \"SELL\", \"rationale\": \"...\"}}"
            ),
        )?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_covers_every_role_and_task() {
        let catalog = default_catalog().unwrap();
        for role in Role::ALL {
            assert!(catalog.contains(role.as_str()), "missing {role}");
        }
        for task in TASKS {
            assert!(catalog.contains(task), "missing {task}");
        }
        assert_eq!(catalog.version("fundamentals_analyst"), Some("v3"));
    }

    #[test]
    fn test_fundamentals_prompt_asks_for_metrics_block() {
        let rendered = default_catalog()
            .unwrap()
            .render(
                "fundamentals_analyst",
                &json!({ "ticker": "600519", "trade_date": "2024-03-01" }),
            )
            .unwrap();
        let template_block = tradeflow_risk::extract(&rendered.text, tradeflow_risk::METRICS_BLOCK);

        assert!(rendered.text.contains("covering 600519 as of 2024-03-01"));
        for key in [
            "DEBT_RATIO",
            "INTEREST_COVERAGE",
            "NET_INCOME",
            "OPERATING_CASH_FLOW",
            "FREE_CASH_FLOW",
            "DIVIDENDS_PAID",
            "PAYOUT_RATIO",
            "ROE",
            "ROE_5Y_AVG",
            "PROFIT_TREND",
            "PROFIT_STABILITY",
            "NET_MARGIN",
            "PE_RATIO",
            "PB_RATIO",
            "CORE_SEGMENT_GROWTH",
        ] {
            assert!(template_block.contains(key), "{key} missing from the metrics block");
        }
    }

    #[test]
    fn test_debate_briefing_renders_history_only_when_present() {
        let catalog = default_catalog().unwrap();
        let vars = |history: &str| {
            json!({
                "ticker": "AAPL",
                "trade_date": "2024-05-10",
                "round": 2,
                "reports": [{ "title": "News Analyst", "text": "Launch event." }],
                "history": history,
            })
        };

        let first = catalog.render(DEBATE_TASK, &vars("")).unwrap().text;
        let second = catalog
            .render(DEBATE_TASK, &vars("Bull (round 1): Services growth."))
            .unwrap()
            .text;

        assert!(first.starts_with("Debate round 2 on AAPL (2024-05-10)."));
        assert!(first.contains("## News Analyst\nLaunch event."));
        assert!(!first.contains("Debate so far"));
        assert!(second.contains("Debate so far:\nBull (round 1): Services growth."));
    }

    #[test]
    fn test_review_briefing_keeps_literal_json() {
        let text = default_catalog()
            .unwrap()
            .render(REVIEW_TASK, &json!({ "ticker": "AAPL", "review": 1, "draft": "Buy 2%." }))
            .unwrap()
            .text;

        assert!(text.contains(r#"{"verdict": "APPROVED" or "REVISE""#));
        assert!(text.contains("Trading plan:\nBuy 2%."));
    }

    #[test]
    fn test_run_prompts_fall_back_on_missing_templates() {
        let empty = PromptCatalog::default();
        let prompts = RunPrompts::new(&empty, "AAPL", NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());

        let system = prompts.system(Role::Trader);
        assert_eq!(system.text, "You are the Trader for AAPL.");
        assert_eq!(system.version, UNVERSIONED);
        assert_eq!(
            prompts.briefing(TRADER_TASK, json!({})),
            "Continue your work on AAPL."
        );
    }

    #[test]
    fn test_run_prompts_merge_base_vars() {
        let catalog = default_catalog().unwrap();
        let prompts = RunPrompts::new(&catalog, "AAPL", NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());

        let text = prompts.briefing(
            TRADER_TASK,
            json!({ "reports": report_views([(Role::NewsAnalyst, "Launch event.")]) }),
        );

        assert!(text.starts_with("Draft the trading plan for AAPL (2024-05-10)."));
        assert!(text.contains("The debate stage was skipped"));
        assert_eq!(prompts.system(Role::Trader).version, "v1");
    }
}
