//! Operation - a single write against the target store
//!
//! Retries re-submit the same logical operation (same `id`), never a copy.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::source_record::RecordData;
use crate::value_objects::{OperationKind, ResourceKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub operation_kind: OperationKind,
    pub resource_kind: ResourceKind,
    pub payload: RecordData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl Operation {
    pub fn create(resource_kind: ResourceKind, payload: RecordData) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_kind: OperationKind::Create,
            resource_kind,
            payload,
            external_id: None,
        }
    }

    pub fn update(resource_kind: ResourceKind, external_id: String, payload: RecordData) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_kind: OperationKind::Update,
            resource_kind,
            payload,
            external_id: Some(external_id),
        }
    }

    pub fn delete(resource_kind: ResourceKind, external_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_kind: OperationKind::Delete,
            resource_kind,
            payload: RecordData::new(),
            external_id: Some(external_id),
        }
    }

    /// UPDATE when the record already exists in the target store, CREATE otherwise
    pub fn upsert(resource_kind: ResourceKind, payload: RecordData, external_id: Option<String>) -> Self {
        match external_id {
            Some(id) => Self::update(resource_kind, id, payload),
            None => Self::create(resource_kind, payload),
        }
    }

    /// Short human-readable label for logs and error reports
    pub fn label(&self) -> String {
        let key = self
            .payload
            .get("sku")
            .or_else(|| self.payload.get("email"))
            .or_else(|| self.payload.get("title"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.external_id.clone())
            .unwrap_or_else(|| self.id.to_string());
        format!("{} {} {}", self.operation_kind, self.resource_kind, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_picks_kind_from_external_id() {
        let payload = json!({"title": "Widget"}).as_object().cloned().unwrap_or_default();
        let create = Operation::upsert(ResourceKind::Product, payload.clone(), None);
        let update = Operation::upsert(ResourceKind::Product, payload, Some("gid-1".to_string()));

        assert_eq!(create.operation_kind, OperationKind::Create);
        assert_eq!(update.operation_kind, OperationKind::Update);
        assert_eq!(update.external_id.as_deref(), Some("gid-1"));
    }

    #[test]
    fn test_label_prefers_sku() {
        let payload = json!({"title": "Widget", "sku": "W-1"}).as_object().cloned().unwrap_or_default();
        let op = Operation::create(ResourceKind::Product, payload);
        assert_eq!(op.label(), "create product W-1");
    }
}
