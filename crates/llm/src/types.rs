//! Results of the mapping-suggestion calls

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldDataType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
    Email,
    Currency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedField {
    pub name: String,
    #[serde(default, rename = "type")]
    pub data_type: FieldDataType,
    #[serde(default)]
    pub sample_values: Vec<Value>,
}

/// Output of schema detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedSchema {
    pub fields: Vec<DetectedField>,
    /// POS system the export most likely came from, `"generic"` if unknown
    pub detected_source: String,
    /// 0.0..=1.0
    pub confidence: f32,
}

impl DetectedSchema {
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// Output of data validation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataValidationResult {
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}
