//! Verdict parsing for review and decision outputs
//!
//! Generated text is parsed in layers: a strict JSON payload first, then
//! keyword inference over the prose, then a non-blocking default. A reply
//! that cannot be read never stalls the run.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid pattern")
});

static REJECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(not\s+approved?|reject(ed)?|needs?[\s_]+(a[\s_]+)?revision|revise|disapprove[ds]?)\b")
        .expect("valid pattern")
});

/// Revision language under a negation within the same clause, e.g.
/// "no need to revise" or "nothing to reject"
static NEGATED_REJECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:no|not|never|nothing|without|don'?t|doesn'?t)\s+(?:[\w']+\s+){0,3}?(?:revis\w*|reject\w*|disapprov\w*)",
    )
    .expect("valid pattern")
});

/// An explicit "Verdict: ..." line
static VERDICT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[\s*#>-]*(?:final\s+)?(?:verdict|decision|status)\s*\**\s*[:：]\s*\**\s*(approved?|revise|needs?[\s_]+revision|rejected?)\b",
    )
    .expect("valid pattern")
});

static APPROVAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(approved?|lgtm|accept(ed)?)\b").expect("valid pattern")
});

static FINAL_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)final\s+(?:transaction\s+proposal|decision|action)\s*[:：]\s*\**\s*(buy|hold|sell)\b")
        .expect("valid pattern")
});

static ACTION_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(BUY|HOLD|SELL)\b").expect("valid pattern"));

/// Which layer produced a parsed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseSource {
    Json,
    Text,
    Default,
}

/// Outcome of one review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewVerdict {
    #[default]
    Approved,
    NeedsRevision,
}

impl fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approved => "APPROVED",
            Self::NeedsRevision => "NEEDS_REVISION",
        })
    }
}

/// A parsed review with the feedback to pass to the next revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub verdict: ReviewVerdict,
    pub feedback: String,
    pub issues: Vec<String>,
    pub source: ParseSource,
}

impl Review {
    pub fn is_approved(&self) -> bool {
        self.verdict == ReviewVerdict::Approved
    }
}

/// Final trading action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Buy,
    #[default]
    Hold,
    Sell,
}

impl TradeAction {
    fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "HOLD" => Some(Self::Hold),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "BUY",
            Self::Hold => "HOLD",
            Self::Sell => "SELL",
        })
    }
}

/// Parsed final decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub action: TradeAction,
    pub rationale: String,
    pub source: ParseSource,
}

#[derive(Deserialize)]
struct ReviewPayload {
    #[serde(alias = "decision", alias = "status")]
    verdict: String,
    #[serde(default, alias = "comments", alias = "reason")]
    feedback: Option<String>,
    #[serde(default)]
    issues: Vec<String>,
}

#[derive(Deserialize)]
struct DecisionPayload {
    #[serde(alias = "decision", alias = "recommendation")]
    action: String,
    #[serde(default, alias = "reason", alias = "reasoning")]
    rationale: Option<String>,
}

/// Parse a reviewer reply
///
/// Defaults to [`ReviewVerdict::Approved`] when nothing can be read.
pub fn parse_review(text: &str) -> Review {
    if let Some(payload) = json_payload::<ReviewPayload>(text) {
        if let Some(verdict) = infer_review(&payload.verdict) {
            return Review {
                verdict,
                feedback: payload.feedback.unwrap_or_default(),
                issues: payload.issues,
                source: ParseSource::Json,
            };
        }
    }

    let feedback = text.trim().to_string();
    match infer_review(text) {
        Some(verdict) => Review {
            verdict,
            feedback,
            issues: Vec::new(),
            source: ParseSource::Text,
        },
        None => {
            debug!("No review verdict found; defaulting to approved");
            Review {
                verdict: ReviewVerdict::Approved,
                feedback,
                issues: Vec::new(),
                source: ParseSource::Default,
            }
        }
    }
}

/// Parse a final decision
///
/// Defaults to [`TradeAction::Hold`] when nothing can be read.
pub fn parse_decision(text: &str) -> TradeDecision {
    if let Some(payload) = json_payload::<DecisionPayload>(text) {
        if let Some(action) = TradeAction::from_word(&payload.action) {
            return TradeDecision {
                action,
                rationale: payload.rationale.unwrap_or_default(),
                source: ParseSource::Json,
            };
        }
    }

    let rationale = text.trim().to_string();
    if let Some(action) = infer_action(text) {
        return TradeDecision {
            action,
            rationale,
            source: ParseSource::Text,
        };
    }

    debug!("No trade action found; defaulting to hold");
    TradeDecision {
        action: TradeAction::Hold,
        rationale,
        source: ParseSource::Default,
    }
}

/// An explicit verdict line wins. Otherwise rejection language wins over
/// approval, so "not approved" reads as a rejection, once negated revision
/// phrases such as "no need to revise" are set aside.
fn infer_review(text: &str) -> Option<ReviewVerdict> {
    if let Some(caps) = VERDICT_LINE.captures_iter(text).last() {
        let word = caps[1].to_ascii_lowercase();
        return Some(if word.starts_with("approv") {
            ReviewVerdict::Approved
        } else {
            ReviewVerdict::NeedsRevision
        });
    }

    let text = NEGATED_REJECTION.replace_all(text, " ");
    if REJECTION.is_match(&text) {
        Some(ReviewVerdict::NeedsRevision)
    } else if APPROVAL.is_match(&text) {
        Some(ReviewVerdict::Approved)
    } else {
        None
    }
}

/// An explicit "final ...: ACTION" line wins; otherwise a single distinct
/// upper-case action word
fn infer_action(text: &str) -> Option<TradeAction> {
    if let Some(action) = FINAL_ACTION
        .captures_iter(text)
        .last()
        .and_then(|caps| TradeAction::from_word(&caps[1]))
    {
        return Some(action);
    }

    let mut found: Option<TradeAction> = None;
    for caps in ACTION_WORD.captures_iter(text) {
        let action = TradeAction::from_word(&caps[1])?;
        match found {
            Some(prev) if prev != action => return None,
            _ => found = Some(action),
        }
    }
    found
}

/// Deserialize the first JSON object in `text`: a fenced block, the whole
/// text, or the outermost braces
fn json_payload<T: for<'de> Deserialize<'de>>(text: &str) -> Option<T> {
    let mut candidates: Vec<&str> = JSON_FENCE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    candidates.push(text.trim());
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            candidates.push(&text[start..=end]);
        }
    }

    candidates
        .into_iter()
        .find_map(|candidate| serde_json::from_str(candidate).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_from_fenced_json() {
        let review = parse_review(
            "Here is my review:\n```json\n{\"verdict\": \"REVISE\", \"feedback\": \"Stop is too wide.\", \"issues\": [\"stop\"]}\n```",
        );

        assert_eq!(review.verdict, ReviewVerdict::NeedsRevision);
        assert_eq!(review.feedback, "Stop is too wide.");
        assert_eq!(review.issues, vec!["stop".to_string()]);
        assert_eq!(review.source, ParseSource::Json);
    }

    #[test]
    fn test_review_from_bare_json() {
        let review = parse_review(r#"{"verdict": "APPROVED"}"#);
        assert!(review.is_approved());
        assert_eq!(review.source, ParseSource::Json);
    }

    #[test]
    fn test_truncated_json_falls_back_to_text() {
        let review = parse_review(r#"{"verdict": "REJECTED", "feedback": "Position size is"#);
        assert_eq!(review.verdict, ReviewVerdict::NeedsRevision);
        assert_eq!(review.source, ParseSource::Text);
    }

    #[test]
    fn test_review_text_inference() {
        assert_eq!(
            parse_review("The plan is not approved until hedged.").verdict,
            ReviewVerdict::NeedsRevision
        );
        assert_eq!(
            parse_review("Looks sound. Approved.").verdict,
            ReviewVerdict::Approved
        );
    }

    #[test]
    fn test_negated_revision_language_reads_as_approval() {
        for text in [
            "Approved. No need to revise anything.",
            "The plan is not rejected; approved as written.",
            "Nothing to revise here, approved.",
            "LGTM, I don't think we should reject this.",
        ] {
            let review = parse_review(text);
            assert_eq!(review.verdict, ReviewVerdict::Approved, "{text}");
            assert_eq!(review.source, ParseSource::Text, "{text}");
        }

        assert_eq!(
            parse_review("Not approved; revise the stop level.").verdict,
            ReviewVerdict::NeedsRevision
        );
    }

    #[test]
    fn test_verdict_line_wins_over_prose() {
        let review = parse_review(
            "Sizing looks aggressive but the hedge makes up for it; I would not reject it.\n\n**Verdict:** APPROVED",
        );
        assert!(review.is_approved());

        let review = parse_review("Good thesis overall, approved in spirit.\nVerdict: NEEDS_REVISION");
        assert_eq!(review.verdict, ReviewVerdict::NeedsRevision);
    }

    #[test]
    fn test_json_needs_revision_verdict() {
        let review = parse_review(r#"{"verdict": "NEEDS_REVISION", "feedback": "Cut size."}"#);
        assert_eq!(review.verdict, ReviewVerdict::NeedsRevision);
        assert_eq!(review.source, ParseSource::Json);
    }

    #[test]
    fn test_unreadable_review_defaults_to_approved() {
        let review = parse_review("The weather is nice.");
        assert!(review.is_approved());
        assert_eq!(review.source, ParseSource::Default);
        assert_eq!(review.feedback, "The weather is nice.");
    }

    #[test]
    fn test_decision_parsing_layers() {
        let json = parse_decision(r#"{"action": "sell", "rationale": "Leverage."}"#);
        assert_eq!(json.action, TradeAction::Sell);
        assert_eq!(json.rationale, "Leverage.");
        assert_eq!(json.source, ParseSource::Json);

        let marker = parse_decision(
            "We considered a BUY but risks dominate.\nFINAL TRANSACTION PROPOSAL: **HOLD**",
        );
        assert_eq!(marker.action, TradeAction::Hold);
        assert_eq!(marker.source, ParseSource::Text);

        let single = parse_decision("Recommendation: BUY on weakness.");
        assert_eq!(single.action, TradeAction::Buy);
    }

    #[test]
    fn test_ambiguous_decision_defaults_to_hold() {
        let decision = parse_decision("Either BUY or SELL could work here.");
        assert_eq!(decision.action, TradeAction::Hold);
        assert_eq!(decision.source, ParseSource::Default);

        assert_eq!(parse_decision("").action, TradeAction::Hold);
    }
}
