//! Post-migration integrity check of original vs. migrated records

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use common::VerificationConfig;
use domain::RecordData;

const NUMERIC_TOLERANCE: f64 = 1e-9;

/// Differences found on one matched record pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inconsistency {
    /// Match key of the pair, e.g. `{"sku": "A"}`
    #[serde(flatten)]
    pub key: RecordData,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub integrity_percent: f64,
    pub missing_records: Vec<RecordData>,
    pub inconsistencies: Vec<Inconsistency>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.missing_records.is_empty() && self.inconsistencies.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct IntegrityVerifier {
    match_keys: Vec<String>,
    critical_fields: Vec<String>,
}

impl Default for IntegrityVerifier {
    fn default() -> Self {
        Self::from_config(&VerificationConfig::default())
    }
}

impl IntegrityVerifier {
    pub fn from_config(config: &VerificationConfig) -> Self {
        Self {
            match_keys: config.match_keys.clone(),
            critical_fields: config.critical_fields.clone(),
        }
    }

    pub fn verify(&self, original: &[RecordData], migrated: &[RecordData]) -> IntegrityReport {
        // (key field, key value) → first migrated record carrying it
        let mut index: HashMap<(&str, String), &RecordData> = HashMap::new();
        for record in migrated {
            for key in &self.match_keys {
                if let Some(value) = key_value(record, key) {
                    index.entry((key.as_str(), value)).or_insert(record);
                }
            }
        }

        let mut missing_records = Vec::new();
        let mut inconsistencies = Vec::new();

        for record in original {
            // keys the original lacks are skipped; the first key that finds a counterpart wins
            let matched = self.match_keys.iter().find_map(|key| {
                let value = key_value(record, key)?;
                let counterpart = *index.get(&(key.as_str(), value.clone()))?;
                Some((key.as_str(), value, counterpart))
            });

            let Some((key, value, counterpart)) = matched else {
                missing_records.push(record.clone());
                continue;
            };

            let issues = self.compare(record, counterpart);
            if !issues.is_empty() {
                let mut match_key = RecordData::new();
                match_key.insert(key.to_string(), Value::String(value));
                inconsistencies.push(Inconsistency {
                    key: match_key,
                    issues,
                });
            }
        }

        let total = original.len();
        let integrity_percent = if total == 0 {
            100.0
        } else {
            (total - missing_records.len()) as f64 / total as f64 * 100.0
        };

        IntegrityReport {
            integrity_percent,
            missing_records,
            inconsistencies,
        }
    }

    fn compare(&self, original: &RecordData, migrated: &RecordData) -> Vec<String> {
        self.critical_fields
            .iter()
            .filter_map(|field| {
                let expected = original.get(field).filter(|v| !v.is_null())?;
                let actual = migrated.get(field).unwrap_or(&Value::Null);
                if values_equal(expected, actual) {
                    None
                } else {
                    Some(format!("{field}: {} → {}", display(expected), display(actual)))
                }
            })
            .collect()
    }
}

/// Non-empty match value as a string
fn key_value(record: &RecordData, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return (x - y).abs() < NUMERIC_TOLERANCE;
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.trim() == y.trim(),
        _ => a == b,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(missing)".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> Vec<RecordData> {
        value
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_object().cloned()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_price_difference_is_reported_under_match_key() {
        let report = IntegrityVerifier::default().verify(
            &records(json!([{"sku": "A", "price": 10}])),
            &records(json!([{"sku": "A", "price": 12}])),
        );

        assert_eq!(report.integrity_percent, 100.0);
        assert!(report.missing_records.is_empty());
        assert_eq!(report.inconsistencies.len(), 1);
        assert_eq!(report.inconsistencies[0].issues, vec!["price: 10 → 12".to_string()]);
        assert_eq!(
            serde_json::to_value(&report.inconsistencies[0]).expect("serialize"),
            json!({"sku": "A", "issues": ["price: 10 → 12"]})
        );
    }

    #[test]
    fn test_empty_original_is_fully_consistent() {
        let report = IntegrityVerifier::default().verify(&[], &records(json!([{"sku": "X"}])));
        assert_eq!(report.integrity_percent, 100.0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_numeric_strings_compare_numerically() {
        let report = IntegrityVerifier::default().verify(
            &records(json!([{"sku": "A", "price": "10"}])),
            &records(json!([{"sku": "A", "price": "10.00"}])),
        );
        assert!(report.is_clean());
    }

    #[test]
    fn test_missing_records_reduce_integrity() {
        let report = IntegrityVerifier::default().verify(
            &records(json!([
                {"sku": "A"},
                {"sku": "B"},
                {"id": 7, "title": "By id"},
                {"email": "a@example.com"}
            ])),
            &records(json!([{"sku": "A"}, {"id": 7, "title": "By id"}])),
        );

        assert_eq!(report.integrity_percent, 50.0);
        assert_eq!(report.missing_records.len(), 2);
    }

    #[test]
    fn test_later_key_matches_when_sku_differs() {
        let report = IntegrityVerifier::default().verify(
            &records(json!([{"sku": "A", "email": "x@example.com", "title": "T"}])),
            &records(json!([{"sku": "B", "email": "x@example.com", "title": "T"}])),
        );

        assert!(report.missing_records.is_empty());
        assert_eq!(report.integrity_percent, 100.0);
        assert_eq!(report.inconsistencies.len(), 1);
        assert_eq!(report.inconsistencies[0].issues, vec!["sku: A → B".to_string()]);
        assert_eq!(
            serde_json::to_value(&report.inconsistencies[0]).expect("serialize"),
            json!({"email": "x@example.com", "issues": ["sku: A → B"]})
        );
    }

    #[test]
    fn test_earlier_key_wins_when_several_match() {
        let report = IntegrityVerifier::default().verify(
            &records(json!([{"sku": "A", "email": "x@example.com"}])),
            &records(json!([
                {"sku": "Z", "email": "x@example.com"},
                {"sku": "A", "email": "other@example.com"}
            ])),
        );

        assert_eq!(report.inconsistencies.len(), 1);
        assert_eq!(report.inconsistencies[0].key.get("sku"), Some(&json!("A")));
        assert_eq!(
            report.inconsistencies[0].issues,
            vec!["email: x@example.com → other@example.com".to_string()]
        );
    }

    #[test]
    fn test_no_shared_key_is_missing() {
        let report = IntegrityVerifier::default().verify(
            &records(json!([{"sku": "A", "email": "x@example.com"}])),
            &records(json!([{"sku": "B", "email": "y@example.com"}])),
        );
        assert_eq!(report.missing_records.len(), 1);
        assert_eq!(report.integrity_percent, 0.0);
    }

    #[test]
    fn test_null_fields_in_original_are_skipped() {
        let report = IntegrityVerifier::default().verify(
            &records(json!([{"sku": "A", "title": null, "price": 5}])),
            &records(json!([{"sku": "A", "title": "Renamed", "price": 5.0}])),
        );
        assert!(report.is_clean());
    }

    #[test]
    fn test_field_missing_on_migrated_side() {
        let report = IntegrityVerifier::default().verify(
            &records(json!([{"email": "a@example.com", "title": "Widget"}])),
            &records(json!([{"email": "a@example.com"}])),
        );
        assert_eq!(report.inconsistencies[0].issues, vec!["title: Widget → (missing)".to_string()]);
    }
}
