//! SourceRecord - one parsed POS row tagged with its resource kind

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value_objects::ResourceKind;

/// Field name → value map used for raw and transformed records
pub type RecordData = serde_json::Map<String, Value>;

/// Key under which a row may reference an already existing target entity
pub const EXTERNAL_ID_FIELD: &str = "external_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub resource: ResourceKind,
    pub data: RecordData,
}

impl SourceRecord {
    pub fn new(resource: ResourceKind, data: RecordData) -> Self {
        Self { resource, data }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Identifier of the matching entity in the target store, if any
    pub fn external_id(&self) -> Option<String> {
        match self.data.get(EXTERNAL_ID_FIELD)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
