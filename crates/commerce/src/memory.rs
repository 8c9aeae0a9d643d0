//! In-process [`CommerceApi`] used for dry runs
//!
//! Writes land in a concurrent map keyed by resource kind. Bulk jobs finish
//! synchronously at submission time.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use domain::{Operation, OperationKind, RecordData, ResourceKind};

use crate::api::CommerceApi;
use crate::error::{CommerceApiError, CommerceResult};
use crate::types::{BulkJobState, BulkJobStatus, RateLimitSnapshot};

#[derive(Debug, Default)]
pub struct InMemoryCommerceStore {
    resources: DashMap<ResourceKind, Vec<RecordData>>,
    jobs: DashMap<String, BulkJobStatus>,
    next_id: AtomicU64,
    quota: Mutex<Option<RateLimitSnapshot>>,
}

impl InMemoryCommerceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate existing entities, e.g. for backup or verification
    pub fn seed(&self, kind: ResourceKind, records: Vec<RecordData>) {
        let mut stored = self.resources.entry(kind).or_default();
        for mut record in records {
            if !record.contains_key("id") {
                record.insert("id".into(), Value::from(self.allocate_id()));
            }
            stored.push(record);
        }
    }

    pub fn records(&self, kind: ResourceKind) -> Vec<RecordData> {
        self.resources
            .get(&kind)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Pretend the remote bucket reported this quota
    pub fn set_quota(&self, used: u32, capacity: u32) {
        *self.quota.lock() = Some(RateLimitSnapshot { used, capacity });
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn insert(&self, kind: ResourceKind, payload: &RecordData) -> RecordData {
        let mut record = payload.clone();
        record.insert("id".into(), Value::from(self.allocate_id()));
        self.resources.entry(kind).or_default().push(record.clone());
        record
    }
}

fn id_matches(record: &RecordData, external_id: &str) -> bool {
    match record.get("id") {
        Some(Value::String(s)) => s == external_id,
        Some(Value::Number(n)) => n.to_string() == external_id,
        _ => false,
    }
}

#[async_trait]
impl CommerceApi for InMemoryCommerceStore {
    async fn execute(&self, operation: &Operation) -> CommerceResult<RecordData> {
        let kind = operation.resource_kind;
        match (operation.operation_kind, operation.external_id.as_deref()) {
            (OperationKind::Create, _) => Ok(self.insert(kind, &operation.payload)),
            (OperationKind::Update, Some(id)) => {
                let mut stored = self.resources.entry(kind).or_default();
                let record = stored
                    .iter_mut()
                    .find(|r| id_matches(r, id))
                    .ok_or_else(|| CommerceApiError::api(format!("{}/{id}", kind.plural()), 404, "Not Found"))?;
                for (key, value) in &operation.payload {
                    record.insert(key.clone(), value.clone());
                }
                Ok(record.clone())
            }
            (OperationKind::Delete, Some(id)) => {
                let mut stored = self.resources.entry(kind).or_default();
                let before = stored.len();
                stored.retain(|r| !id_matches(r, id));
                if stored.len() == before {
                    return Err(CommerceApiError::api(format!("{}/{id}", kind.plural()), 404, "Not Found"));
                }
                Ok(RecordData::new())
            }
            (op_kind, None) => Err(CommerceApiError::InvalidOperation(format!(
                "{op_kind} {kind} requires an external id"
            ))),
        }
    }

    async fn list_resources(&self, kind: ResourceKind) -> CommerceResult<Vec<RecordData>> {
        Ok(self.records(kind))
    }

    async fn submit_bulk_job(&self, kind: ResourceKind, records: &[RecordData]) -> CommerceResult<String> {
        for record in records {
            self.insert(kind, record);
        }
        let id = format!("gid://memory/BulkOperation/{}", self.allocate_id());
        self.jobs.insert(
            id.clone(),
            BulkJobStatus {
                id: id.clone(),
                status: BulkJobState::Completed,
                error_code: None,
                object_count: records.len() as u64,
            },
        );
        Ok(id)
    }

    async fn bulk_job_status(&self, job_id: &str) -> CommerceResult<BulkJobStatus> {
        self.jobs
            .get(job_id)
            .map(|j| j.value().clone())
            .ok_or_else(|| CommerceApiError::api("bulkStatus", 404, format!("unknown job {job_id}")))
    }

    async fn cancel_bulk_job(&self, job_id: &str) -> CommerceResult<()> {
        match self.jobs.get_mut(job_id) {
            Some(mut job) if !job.status.is_terminal() => {
                job.status = BulkJobState::Canceled;
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(CommerceApiError::api("bulkCancel", 404, format!("unknown job {job_id}"))),
        }
    }

    fn rate_limit_status(&self) -> Option<RateLimitSnapshot> {
        *self.quota.lock()
    }
}
