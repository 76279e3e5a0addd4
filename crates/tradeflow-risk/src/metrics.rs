//! Metrics snapshot extracted from a structured block

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Number(_) => None,
        }
    }
}

/// Metric name to value, as reported by one block
///
/// Fields explicitly marked not-applicable carry no value; they are kept in
/// a separate set so callers can tell "reported as N/A" from "omitted".
/// Rules only ever look at values, so both read as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    values: BTreeMap<String, MetricValue>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    not_applicable: BTreeSet<String>,
}

impl MetricsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value; clears any not-applicable mark for the key
    pub fn insert(&mut self, key: impl Into<String>, value: MetricValue) {
        let key = key.into();
        self.not_applicable.remove(&key);
        self.values.insert(key, value);
    }

    /// Mark a field as explicitly not applicable; clears any value
    pub fn mark_not_applicable(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.values.remove(&key);
        self.not_applicable.insert(key);
    }

    /// Builder-style numeric insert
    pub fn with_number(mut self, key: &str, value: f64) -> Self {
        self.insert(key, MetricValue::Number(value));
        self
    }

    /// Builder-style text insert
    pub fn with_text(mut self, key: &str, value: &str) -> Self {
        self.insert(key, MetricValue::Text(value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.values.get(key)
    }

    /// Numeric value of a field, if present and numeric
    pub fn number(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(MetricValue::as_number)
    }

    /// Text value of a field, if present and non-numeric
    pub fn text(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(MetricValue::as_text)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_not_applicable(&self, key: &str) -> bool {
        self.not_applicable.contains(key)
    }

    /// Number of fields with a value
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// No values and no not-applicable marks
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.not_applicable.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy fields from `other` that this snapshot neither reports nor
    /// marks not-applicable
    pub fn fill_missing(&mut self, other: &MetricsSnapshot) {
        for (key, value) in &other.values {
            if !self.values.contains_key(key) && !self.not_applicable.contains(key) {
                self.values.insert(key.clone(), value.clone());
            }
        }
        for key in &other.not_applicable {
            if !self.values.contains_key(key) {
                self.not_applicable.insert(key.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_applicable_is_distinct_from_missing() {
        let mut snapshot = MetricsSnapshot::new().with_number("DEBT_RATIO", 40.0);
        snapshot.mark_not_applicable("OPERATING_CASH_FLOW");

        assert_eq!(snapshot.number("DEBT_RATIO"), Some(40.0));
        assert_eq!(snapshot.number("OPERATING_CASH_FLOW"), None);
        assert!(snapshot.is_not_applicable("OPERATING_CASH_FLOW"));
        assert!(!snapshot.is_not_applicable("NET_INCOME"));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_text_and_number_accessors() {
        let snapshot = MetricsSnapshot::new()
            .with_text("SECTOR", "Banking")
            .with_number("ROE", 12.5);

        assert_eq!(snapshot.text("SECTOR"), Some("Banking"));
        assert_eq!(snapshot.number("SECTOR"), None);
        assert_eq!(snapshot.text("ROE"), None);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["values"]["ROE"], 12.5);
        assert_eq!(json["values"]["SECTOR"], "Banking");
    }

    #[test]
    fn test_fill_missing_keeps_own_fields() {
        let mut primary = MetricsSnapshot::new().with_number("DEBT_RATIO", 40.0);
        primary.mark_not_applicable("PAYOUT_RATIO");
        let secondary = MetricsSnapshot::new()
            .with_number("DEBT_RATIO", 90.0)
            .with_number("PAYOUT_RATIO", 120.0)
            .with_text("SECTOR", "Retail");

        primary.fill_missing(&secondary);

        assert_eq!(primary.number("DEBT_RATIO"), Some(40.0));
        assert_eq!(primary.number("PAYOUT_RATIO"), None);
        assert!(primary.is_not_applicable("PAYOUT_RATIO"));
        assert_eq!(primary.text("SECTOR"), Some("Retail"));
    }
}
