//! Applies a field mapping to raw POS rows and checks target-schema limits
//!
//! Price-like fields are strict (non-numeric input is an error) while
//! quantity-like fields fall back to zero.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use domain::{
    coercion_for, FieldCoercion, FieldMappings, RecordData, ResourceKind, SourceRecord,
    SKU_MAX_LEN, TITLE_MAX_LEN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorKind {
    Format,
    Length,
    Range,
    Required,
    Duplicate,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationErrorKind::Format => "FORMAT",
            ValidationErrorKind::Length => "LENGTH",
            ValidationErrorKind::Range => "RANGE",
            ValidationErrorKind::Required => "REQUIRED",
            ValidationErrorKind::Duplicate => "DUPLICATE",
        };
        f.write_str(s)
    }
}

/// One constraint violation on one field
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} error on {field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordValidation {
    pub is_valid: bool,
    pub errors: Vec<FieldError>,
}

/// A field error located in the input set (`row` is zero-based)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    #[serde(flatten)]
    pub error: FieldError,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Transformed records that passed every check, in input order
    pub valid_data: Vec<SourceRecord>,
    pub errors: Vec<RowError>,
    pub warnings: Vec<FieldError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of distinct rows with at least one error
    pub fn invalid_rows(&self) -> usize {
        let mut rows: Vec<usize> = self.errors.iter().map(|e| e.row).collect();
        rows.dedup();
        rows.len()
    }
}

/// Copy every mapped field into its target, coercing by target field class
pub fn transform(record: &RecordData, mappings: &FieldMappings) -> Result<RecordData, FieldError> {
    let mut transformed = RecordData::new();

    for mapping in mappings.active() {
        let Some(value) = record.get(&mapping.source_field) else {
            continue;
        };
        let target = mapping.target_field.as_str();

        let coerced = match coercion_for(target) {
            FieldCoercion::Price => {
                if value.is_null() {
                    continue;
                }
                let amount = parse_number(value).ok_or_else(|| {
                    FieldError::new(
                        target,
                        ValidationErrorKind::Format,
                        format!("'{}' is not a valid number", display(value)),
                    )
                })?;
                Value::String(format!("{amount:.2}"))
            }
            FieldCoercion::Quantity => Value::from(parse_quantity(value)),
            FieldCoercion::Tags => match value {
                Value::Array(items) => Value::String(
                    items.iter().map(display).collect::<Vec<_>>().join(","),
                ),
                other => other.clone(),
            },
            FieldCoercion::PassThrough => value.clone(),
        };

        transformed.insert(target.to_string(), coerced);
    }

    Ok(transformed)
}

/// Title ≤ 255 chars, price numeric and ≥ 0, sku ≤ 100 chars
pub fn validate(transformed: &RecordData) -> RecordValidation {
    let mut errors = Vec::new();

    if let Some(title) = transformed.get("title").and_then(Value::as_str) {
        let len = title.chars().count();
        if len > TITLE_MAX_LEN {
            errors.push(FieldError::new(
                "title",
                ValidationErrorKind::Length,
                format!("title is {len} characters, the limit is {TITLE_MAX_LEN}"),
            ));
        }
    }

    if let Some(price) = transformed.get("price").filter(|v| !v.is_null()) {
        match parse_number(price) {
            None => errors.push(FieldError::new(
                "price",
                ValidationErrorKind::Format,
                format!("'{}' is not a valid number", display(price)),
            )),
            Some(amount) if amount < 0.0 => errors.push(FieldError::new(
                "price",
                ValidationErrorKind::Range,
                format!("price {amount:.2} is negative"),
            )),
            Some(_) => {}
        }
    }

    if let Some(sku) = transformed.get("sku").and_then(Value::as_str) {
        let len = sku.chars().count();
        if len > SKU_MAX_LEN {
            errors.push(FieldError::new(
                "sku",
                ValidationErrorKind::Length,
                format!("sku is {len} characters, the limit is {SKU_MAX_LEN}"),
            ));
        }
    }

    RecordValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Transform and validate a whole record set
pub fn validate_records(records: &[SourceRecord], mappings: &FieldMappings) -> ValidationReport {
    let mut report = ValidationReport::default();

    for target in mappings.duplicate_targets() {
        report.warnings.push(FieldError::new(
            target.clone(),
            ValidationErrorKind::Duplicate,
            format!("several source fields are mapped to {target}"),
        ));
    }

    let title_mapped = mappings.active().any(|m| m.target_field == "title");
    let mut rows_by_sku: HashMap<String, Vec<usize>> = HashMap::new();

    for (row, record) in records.iter().enumerate() {
        let transformed = match transform(&record.data, mappings) {
            Ok(transformed) => transformed,
            Err(error) => {
                report.errors.push(RowError { row, error });
                continue;
            }
        };

        let mut errors = validate(&transformed).errors;
        if record.resource == ResourceKind::Product && title_mapped && is_blank(transformed.get("title")) {
            errors.push(FieldError::new(
                "title",
                ValidationErrorKind::Required,
                "product title is empty",
            ));
        }

        if !errors.is_empty() {
            report
                .errors
                .extend(errors.into_iter().map(|error| RowError { row, error }));
            continue;
        }

        if let Some(sku) = transformed.get("sku").filter(|v| !is_blank(Some(*v))) {
            rows_by_sku
                .entry(format!("{}:{}", record.resource, display(sku)))
                .or_default()
                .push(row);
        }
        report
            .valid_data
            .push(SourceRecord::new(record.resource, transformed));
    }

    let mut duplicates: Vec<(String, Vec<usize>)> = rows_by_sku
        .into_iter()
        .filter(|(_, rows)| rows.len() > 1)
        .collect();
    duplicates.sort();
    for (key, rows) in duplicates {
        let sku = key.split_once(':').map(|(_, sku)| sku).unwrap_or(key.as_str());
        let rows = rows.iter().map(usize::to_string).collect::<Vec<_>>().join(", ");
        report.warnings.push(FieldError::new(
            "sku",
            ValidationErrorKind::Duplicate,
            format!("sku '{sku}' appears in rows {rows}"),
        ));
    }

    report
}

/// JSON number or numeric string; non-finite values are rejected
fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Integer, truncated number, or the leading integer of a string; 0 otherwise
fn parse_quantity(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                return n;
            }
            if let Some(f) = s.parse::<f64>().ok().filter(|f| f.is_finite()) {
                return f.trunc() as i64;
            }
            leading_integer(s).unwrap_or(0)
        }
        _ => 0,
    }
}

fn leading_integer(s: &str) -> Option<i64> {
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(digits.len(), |(i, _)| i);
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
