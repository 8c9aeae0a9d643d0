//! Deterministic, fully local stand-in for the LLM calls
//!
//! Field names are normalised to `snake_case` tokens and matched against a
//! keyword table: an exact match scores 90, a whole-token match 70.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use domain::{FieldMappings, MappingSuggestion, RecordData};

use crate::suggester::{MappingSuggester, SuggestionResult};
use crate::types::{DataValidationResult, DetectedField, DetectedSchema, FieldDataType};

const EXACT_CONFIDENCE: u8 = 90;
const TOKEN_CONFIDENCE: u8 = 70;
const SAMPLE_VALUES: usize = 3;

/// Target field → keywords, most specific targets first
const KEYWORDS: &[(&str, &[&str])] = &[
    ("email", &["email", "e_mail", "email_address"]),
    ("first_name", &["first_name", "firstname", "given_name", "fname"]),
    ("last_name", &["last_name", "lastname", "surname", "family_name", "lname"]),
    ("phone", &["phone", "telephone", "mobile", "cell"]),
    ("zip", &["zip", "zip_code", "postal_code", "postcode"]),
    ("barcode", &["barcode", "upc", "ean", "gtin"]),
    ("sku", &["sku", "item_sku", "variant_sku", "custom_sku", "item_number", "product_code", "code"]),
    ("compare_at_price", &["compare_at_price", "msrp", "retail_price", "original_price", "list_price"]),
    ("cost", &["cost", "unit_cost", "cost_price", "supply_price", "default_cost"]),
    ("subtotal_price", &["subtotal", "sub_total", "subtotal_price"]),
    ("total_tax", &["total_tax", "tax", "tax_amount"]),
    ("total_price", &["total_price", "order_total", "grand_total", "total"]),
    ("price", &["price", "unit_price", "sale_price", "selling_price", "variant_price", "amount"]),
    (
        "inventory_quantity",
        &["inventory_quantity", "quantity_on_hand", "qty", "quantity", "stock", "on_hand", "inventory"],
    ),
    ("vendor", &["vendor", "supplier", "brand", "manufacturer"]),
    ("product_type", &["product_type", "category", "type", "department"]),
    ("tags", &["tags", "tag", "keywords", "labels"]),
    ("weight", &["weight", "item_weight"]),
    ("description", &["description", "desc", "details", "body_html"]),
    ("title", &["title", "item_name", "product_name", "name", "item"]),
    ("order_number", &["order_number", "order_id", "order_no", "receipt_number", "invoice"]),
    ("currency", &["currency"]),
    ("address", &["address", "address1", "street"]),
    ("city", &["city", "town"]),
    ("country", &["country"]),
    ("accepts_marketing", &["accepts_marketing", "marketing", "newsletter", "opt_in"]),
    ("created_at", &["created_at", "order_date", "date", "created"]),
    ("location", &["location", "store", "outlet", "warehouse"]),
    ("status", &["status", "visibility"]),
];

/// Header fragments characteristic of each POS export
const SOURCE_HINTS: &[(&str, &[&str])] = &[
    ("square", &["token", "variation_name", "item_name", "square"]),
    ("lightspeed", &["system_id", "custom_sku", "manufact_sku", "default_cost"]),
    ("clover", &["clover_id", "price_type", "alternate_name"]),
    ("shopify", &["handle", "variant_sku", "variant_price", "body_html"]),
    ("vend", &["handle", "supply_price", "retail_price", "supplier_code"]),
    ("toast", &["menu_item", "menu_group", "guid"]),
];

#[derive(Debug, Clone, Default)]
pub struct RuleBasedSuggester;

impl RuleBasedSuggester {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, rows: &[RecordData]) -> DetectedSchema {
        let mut names: Vec<String> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }

        let fields = names
            .iter()
            .map(|name| {
                let sample_values: Vec<Value> = rows
                    .iter()
                    .filter_map(|row| row.get(name))
                    .filter(|v| !is_blank(v))
                    .take(SAMPLE_VALUES)
                    .cloned()
                    .collect();
                DetectedField {
                    name: name.clone(),
                    data_type: infer_type(&sample_values),
                    sample_values,
                }
            })
            .collect();

        let (detected_source, confidence) = detect_source(&names);
        DetectedSchema {
            fields,
            detected_source,
            confidence,
        }
    }

    pub fn suggest(&self, fields: &[String], detected_source: &str) -> Vec<MappingSuggestion> {
        let mut candidates: Vec<(usize, &str, u8)> = fields
            .iter()
            .enumerate()
            .filter_map(|(idx, field)| match_keyword(field).map(|(target, conf)| (idx, target, conf)))
            .collect();
        // strongest claim on a target wins; ties keep column order
        candidates.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));

        let mut claimed: HashSet<&str> = HashSet::new();
        let mut assigned: HashMap<usize, (&str, u8)> = HashMap::new();
        for (idx, target, confidence) in candidates {
            if claimed.insert(target) {
                assigned.insert(idx, (target, confidence));
            }
        }

        fields
            .iter()
            .enumerate()
            .map(|(idx, field)| match assigned.get(&idx) {
                Some((target, confidence)) => MappingSuggestion {
                    source_field: field.clone(),
                    suggested_mapping: target.to_string(),
                    confidence: *confidence,
                    reasoning: format!("keyword match on '{field}' ({detected_source} export)"),
                },
                None => MappingSuggestion {
                    source_field: field.clone(),
                    suggested_mapping: String::new(),
                    confidence: 0,
                    reasoning: "no keyword match".to_string(),
                },
            })
            .collect()
    }

    /// Required titles, numeric prices and unique SKUs
    pub fn check(&self, rows: &[RecordData], mappings: &FieldMappings) -> DataValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let source_for = |target: &str| {
            mappings
                .active()
                .find(|m| m.target_field == target)
                .map(|m| m.source_field.clone())
        };

        match source_for("title") {
            Some(title_field) => {
                let missing: Vec<String> = rows
                    .iter()
                    .enumerate()
                    .filter(|(_, row)| row.get(&title_field).map_or(true, is_blank))
                    .map(|(idx, _)| (idx + 1).to_string())
                    .collect();
                if !missing.is_empty() {
                    errors.push(format!("Missing title in rows {}", missing.join(", ")));
                }
            }
            None if source_for("sku").is_some() || source_for("price").is_some() => {
                warnings.push("No field is mapped to title".to_string());
            }
            None => {}
        }

        if let Some(price_field) = source_for("price") {
            for (idx, row) in rows.iter().enumerate() {
                if let Some(value) = row.get(&price_field).filter(|v| !is_blank(v)) {
                    if numeric(value).is_none() {
                        errors.push(format!("Row {}: price '{}' is not a number", idx + 1, display(value)));
                    }
                }
            }
        }

        if let Some(sku_field) = source_for("sku") {
            let mut rows_by_sku: HashMap<String, Vec<usize>> = HashMap::new();
            for (idx, row) in rows.iter().enumerate() {
                if let Some(sku) = row.get(&sku_field).filter(|v| !is_blank(v)) {
                    rows_by_sku.entry(display(sku)).or_default().push(idx + 1);
                }
            }
            let mut duplicates: Vec<(String, Vec<usize>)> =
                rows_by_sku.into_iter().filter(|(_, idxs)| idxs.len() > 1).collect();
            duplicates.sort();
            for (sku, idxs) in duplicates {
                let rows = idxs.iter().map(usize::to_string).collect::<Vec<_>>().join(", ");
                errors.push(format!("Duplicate SKU '{sku}' in rows {rows}"));
            }
        }

        for target in mappings.duplicate_targets() {
            warnings.push(format!("Several fields are mapped to {target}"));
        }

        DataValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[async_trait]
impl MappingSuggester for RuleBasedSuggester {
    async fn detect_schema(&self, rows: &[RecordData]) -> SuggestionResult<DetectedSchema> {
        Ok(self.detect(rows))
    }

    async fn suggest_mappings(
        &self,
        fields: &[String],
        _rows: &[RecordData],
        detected_source: &str,
    ) -> SuggestionResult<Vec<MappingSuggestion>> {
        Ok(self.suggest(fields, detected_source))
    }

    async fn validate_data(
        &self,
        rows: &[RecordData],
        mappings: &FieldMappings,
    ) -> SuggestionResult<DataValidationResult> {
        Ok(self.check(rows, mappings))
    }
}

/// "Item Name" / "itemName" → "item_name"
fn normalize(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    let mut prev_lower = false;
    for ch in field.chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        } else {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

fn match_keyword(field: &str) -> Option<(&'static str, u8)> {
    let normalized = normalize(field);
    if normalized.is_empty() {
        return None;
    }
    for (target, keywords) in KEYWORDS {
        if keywords.iter().any(|k| *k == normalized) {
            return Some((*target, EXACT_CONFIDENCE));
        }
    }
    let padded = format!("_{normalized}_");
    for (target, keywords) in KEYWORDS {
        if keywords.iter().any(|k| padded.contains(&format!("_{k}_"))) {
            return Some((*target, TOKEN_CONFIDENCE));
        }
    }
    None
}

fn detect_source(names: &[String]) -> (String, f32) {
    let normalized: HashSet<String> = names.iter().map(|n| normalize(n)).collect();
    SOURCE_HINTS
        .iter()
        .map(|(source, hints)| (*source, hints.iter().filter(|h| normalized.contains(**h)).count()))
        .filter(|(_, hits)| *hits > 0)
        .fold(None::<(&str, usize)>, |best, candidate| match best {
            Some(b) if b.1 >= candidate.1 => Some(b),
            _ => Some(candidate),
        })
        .map(|(source, hits)| (source.to_string(), (0.4 + 0.15 * hits as f32).min(0.9)))
        .unwrap_or_else(|| ("generic".to_string(), 0.3))
}

fn infer_type(samples: &[Value]) -> FieldDataType {
    let Some(first) = samples.first() else {
        return FieldDataType::String;
    };
    match first {
        Value::Bool(_) => FieldDataType::Boolean,
        Value::Number(_) => FieldDataType::Number,
        Value::String(s) => {
            let s = s.trim();
            if s.contains('@') && s.contains('.') && !s.contains(' ') {
                FieldDataType::Email
            } else if s.starts_with('$') || s.starts_with('€') || s.starts_with('£') {
                FieldDataType::Currency
            } else if looks_like_date(s) {
                FieldDataType::Date
            } else if s.parse::<f64>().is_ok() {
                FieldDataType::Number
            } else if matches!(s.to_lowercase().as_str(), "true" | "false" | "yes" | "no") {
                FieldDataType::Boolean
            } else {
                FieldDataType::String
            }
        }
        _ => FieldDataType::String,
    }
}

fn looks_like_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 10
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::FieldMapping;
    use rstest::rstest;
    use serde_json::json;

    fn rows(value: Value) -> Vec<RecordData> {
        value
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_object().cloned()).collect())
            .unwrap_or_default()
    }

    #[rstest]
    #[case("Item Name", Some(("title", 90)))]
    #[case("itemName", Some(("title", 90)))]
    #[case("Variant SKU", Some(("sku", 90)))]
    #[case("Customer Email", Some(("email", 70)))]
    #[case("Qty", Some(("inventory_quantity", 90)))]
    #[case("Subtotal", Some(("subtotal_price", 90)))]
    #[case("Updated At", None)]
    #[case("???", None)]
    fn test_keyword_matching(#[case] field: &str, #[case] expected: Option<(&str, u8)>) {
        assert_eq!(match_keyword(field), expected);
    }

    #[test]
    fn test_detect_square_export() {
        let schema = RuleBasedSuggester::new().detect(&rows(json!([
            {"Token": "ABC", "Item Name": "Widget", "Variation Name": "Regular", "Price": "$4.50"},
            {"Token": "DEF", "Item Name": "Gadget", "Variation Name": "Large", "Price": "$6.00"}
        ])));

        assert_eq!(schema.detected_source, "square");
        assert!(schema.confidence > 0.5);
        assert_eq!(schema.fields.len(), 4);
        let price = schema.fields.iter().find(|f| f.name == "Price").expect("price field");
        assert_eq!(price.data_type, FieldDataType::Currency);
        assert_eq!(price.sample_values.len(), 2);
    }

    #[test]
    fn test_unknown_headers_are_generic() {
        let schema = RuleBasedSuggester::new().detect(&rows(json!([{"a": 1}])));
        assert_eq!(schema.detected_source, "generic");
        assert_eq!(schema.fields[0].data_type, FieldDataType::Number);
    }

    #[test]
    fn test_suggest_never_claims_target_twice() {
        let fields = vec!["Name Of Product".to_string(), "Title".to_string(), "Notes".to_string()];
        let suggestions = RuleBasedSuggester::new().suggest(&fields, "generic");

        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[1].suggested_mapping, "title");
        assert_eq!(suggestions[0].suggested_mapping, "");
        assert_eq!(suggestions[2].confidence, 0);
    }

    #[test]
    fn test_check_reports_missing_titles_bad_prices_and_duplicate_skus() {
        let mappings = FieldMappings::new(vec![
            FieldMapping::new("name", "title", 90),
            FieldMapping::new("cost", "price", 90),
            FieldMapping::new("code", "sku", 90),
        ])
        .expect("valid mappings");
        let data = rows(json!([
            {"name": "Widget", "cost": "4.50", "code": "W-1"},
            {"name": "", "cost": "abc", "code": "W-1"},
            {"name": "Gadget", "cost": 3, "code": "G-1"}
        ]));

        let result = RuleBasedSuggester::new().check(&data, &mappings);
        assert!(!result.is_valid);
        assert_eq!(
            result.errors,
            vec![
                "Missing title in rows 2".to_string(),
                "Row 2: price 'abc' is not a number".to_string(),
                "Duplicate SKU 'W-1' in rows 1, 2".to_string(),
            ]
        );
    }
}
