//! Structured-block parser
//!
//! Workers embed machine-readable segments in their free-form reports:
//!
//! ```text
//! === METRICS_START (figures from the FY2023 annual report) ===
//! SECTOR: Banking
//! DEBT_RATIO: 72.5%
//! NET_INCOME: $1,200
//! OPERATING_CASH_FLOW: (N/A)
//! === METRICS_END ===
//! ```
//!
//! A worker may re-emit a corrected block later in the same text; the last
//! block wins and earlier blocks are ignored entirely.

use crate::metrics::{MetricValue, MetricsSnapshot};
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

/// Values meaning "not applicable"
const NOT_APPLICABLE: &[&str] = &["n/a", "na", "none", "null", "-", "—", "不适用"];

/// Characters stripped from values before numeric parsing
const NOISE: &[char] = &[
    '[', ']', '(', ')', '{', '}', '$', '¥', '€', '£', ',', '%',
];

/// Extract the fields of the last `block_name` block in `text`
///
/// Zero blocks yields an empty snapshot. A start marker without an end
/// marker runs to the next start marker or to the end of the text.
pub fn extract(text: &str, block_name: &str) -> MetricsSnapshot {
    let Some(marker) = marker_pattern(block_name) else {
        return MetricsSnapshot::new();
    };

    let Some(lines) = last_block(text, &marker) else {
        debug!(block = block_name, "No structured block found");
        return MetricsSnapshot::new();
    };

    let mut snapshot = MetricsSnapshot::new();
    for line in lines {
        if let Some((key, value)) = parse_field(line) {
            match parse_value(value) {
                Some(value) => snapshot.insert(key, value),
                None => snapshot.mark_not_applicable(key),
            }
        }
    }

    debug!(block = block_name, fields = snapshot.len(), "Extracted structured block");
    snapshot
}

/// Start/end marker line for a block: leading delimiter tokens, then
/// `<NAME>_START` or `<NAME>_END`, then anything
fn marker_pattern(block_name: &str) -> Option<Regex> {
    let pattern = format!(
        r"^\s*[=\-#*]+\s*{}_(START|END)\b",
        regex::escape(block_name.trim())
    );

    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(block = block_name, error = %e, "Invalid block name");
            None
        }
    }
}

fn last_block<'a>(text: &'a str, marker: &Regex) -> Option<Vec<&'a str>> {
    let mut last: Option<Vec<&str>> = None;
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        match marker.captures(line) {
            Some(caps) if caps[1].eq_ignore_ascii_case("START") => {
                if let Some(done) = current.replace(Vec::new()) {
                    last = Some(done);
                }
            }
            Some(_) => {
                if let Some(done) = current.take() {
                    last = Some(done);
                }
            }
            None => {
                if let Some(lines) = current.as_mut() {
                    lines.push(line);
                }
            }
        }
    }

    current.or(last)
}

/// Split a `KEY: value` line, normalizing the key to upper snake case
fn parse_field(line: &str) -> Option<(String, &str)> {
    let line = line
        .trim()
        .trim_start_matches(['-', '*', '•'])
        .trim_start();

    let (key, value) = line.split_once([':', '：'])?;

    let key: String = key
        .trim()
        .trim_matches(['*', '_', '`'])
        .trim()
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '-' {
                '_'
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect();

    if key.is_empty() {
        return None;
    }

    Some((key, value.trim().trim_matches(['*', '`']).trim()))
}

/// `None` for an empty or not-applicable value
fn parse_value(raw: &str) -> Option<MetricValue> {
    let unwrapped = raw.trim_matches(NOISE).trim();
    if unwrapped.is_empty() {
        return None;
    }

    let lower = unwrapped.to_lowercase();
    if NOT_APPLICABLE.contains(&lower.as_str()) {
        return None;
    }

    let cleaned: String = raw
        .chars()
        .filter(|c| !NOISE.contains(c) && !c.is_whitespace())
        .map(|c| if c == '−' { '-' } else { c })
        .collect();
    let cleaned = cleaned.strip_suffix(['x', 'X']).unwrap_or(&cleaned);

    match cleaned.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(MetricValue::Number(n)),
        _ => Some(MetricValue::Text(unwrapped.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_fields_with_noise() {
        let text = "\
Intro paragraph.
=== METRICS_START (FY2023 annual report) ===
SECTOR: Banking
DEBT_RATIO: 72.5%
NET_INCOME: $1,200
OPERATING_CASH_FLOW: (N/A)
PE_RATIO: 12.3x
MARKET_CAP: ¥ 2,500,000
=== METRICS_END ===
Closing remarks.";

        let snapshot = extract(text, "METRICS");

        assert_eq!(snapshot.text("SECTOR"), Some("Banking"));
        assert_eq!(snapshot.number("DEBT_RATIO"), Some(72.5));
        assert_eq!(snapshot.number("NET_INCOME"), Some(1200.0));
        assert_eq!(snapshot.number("PE_RATIO"), Some(12.3));
        assert_eq!(snapshot.number("MARKET_CAP"), Some(2_500_000.0));
        assert!(snapshot.get("OPERATING_CASH_FLOW").is_none());
        assert!(snapshot.is_not_applicable("OPERATING_CASH_FLOW"));
    }

    #[test]
    fn test_no_block_is_empty_not_error() {
        assert!(extract("just prose, DEBT_RATIO: 90", "METRICS").is_empty());
        assert!(extract("", "METRICS").is_empty());
    }

    #[test]
    fn test_last_block_wins_without_carry_forward() {
        let text = "\
=== METRICS_START ===
DEBT_RATIO: 90
ROE: 4
=== METRICS_END ===
Correction follows.
=== METRICS_START (corrected) ===
DEBT_RATIO: 45
=== METRICS_END ===";

        let snapshot = extract(text, "METRICS");

        assert_eq!(snapshot.number("DEBT_RATIO"), Some(45.0));
        assert!(snapshot.get("ROE").is_none());
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_marker_variants_and_case() {
        let text = "\
### metrics_start (revised)
- **Debt Ratio**: 55 %
* interest-coverage: 3.1x
--- Metrics_End ---";

        let snapshot = extract(text, "METRICS");

        assert_eq!(snapshot.number("DEBT_RATIO"), Some(55.0));
        assert_eq!(snapshot.number("INTEREST_COVERAGE"), Some(3.1));
    }

    #[test]
    fn test_truncated_block_runs_to_end_of_text() {
        let text = "\
=== METRICS_START ===
DEBT_RATIO: 30
=== METRICS_END ===
=== METRICS_START ===
DEBT_RATIO: 80
NET_INCOME: 1000";

        let snapshot = extract(text, "METRICS");

        assert_eq!(snapshot.number("DEBT_RATIO"), Some(80.0));
        assert_eq!(snapshot.number("NET_INCOME"), Some(1000.0));
    }

    #[test]
    fn test_unterminated_block_closes_at_next_start() {
        let text = "\
=== METRICS_START ===
ROE: 30
=== METRICS_START ===
ROE: 12
=== METRICS_END ===
trailing prose: ignored";

        let snapshot = extract(text, "METRICS");
        assert_eq!(snapshot.number("ROE"), Some(12.0));
        assert!(snapshot.get("TRAILING_PROSE").is_none());
    }

    #[test]
    fn test_other_block_names_are_ignored() {
        let text = "\
=== SIGNALS_START ===
DEBT_RATIO: 99
=== SIGNALS_END ===";

        assert!(extract(text, "METRICS").is_empty());
        assert_eq!(extract(text, "signals").number("DEBT_RATIO"), Some(99.0));
    }

    #[test]
    fn test_sentinels_and_negative_numbers() {
        let text = "\
=== METRICS_START ===
A: N/A
B: none
C: -
D: 不适用
E: -3,000
F: −12.5%
G:
=== METRICS_END ===";

        let snapshot = extract(text, "METRICS");

        for key in ["A", "B", "C", "D", "G"] {
            assert!(snapshot.get(key).is_none(), "{key} should be absent");
            assert!(snapshot.is_not_applicable(key));
        }
        assert_eq!(snapshot.number("E"), Some(-3000.0));
        assert_eq!(snapshot.number("F"), Some(-12.5));
    }
}
