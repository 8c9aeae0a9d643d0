//! Shared fixtures for the orchestrator integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use commerce::{
    BulkJobStatus, CommerceApi, CommerceApiError, CommerceResult, InMemoryCommerceStore,
    RateLimitSnapshot,
};
use domain::{FieldMapping, FieldMappings, Operation, RecordData, ResourceKind, SourceRecord};

/// Route engine logs to the test harness; `RUST_LOG` overrides the filter
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("orchestrator=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// In-memory store with scripted per-record failures
///
/// `fail_with("W-1", &[429, 429])` makes the first two writes of the record
/// with sku (or email) `W-1` return those statuses; later writes succeed.
#[derive(Default)]
pub struct ScriptedCommerceApi {
    pub store: InMemoryCommerceStore,
    scripts: DashMap<String, VecDeque<u16>>,
    list_failure: Mutex<Option<u16>>,
    executed: AtomicUsize,
}

impl ScriptedCommerceApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, key: &str, statuses: &[u16]) {
        self.scripts.insert(key.to_string(), statuses.iter().copied().collect());
    }

    /// Every `list_resources` call fails with this status
    pub fn fail_listing(&self, status: u16) {
        *self.list_failure.lock() = Some(status);
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

fn record_key(payload: &RecordData) -> Option<String> {
    payload
        .get("sku")
        .or_else(|| payload.get("email"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl CommerceApi for ScriptedCommerceApi {
    async fn execute(&self, operation: &Operation) -> CommerceResult<RecordData> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        if let Some(key) = record_key(&operation.payload) {
            if let Some(mut script) = self.scripts.get_mut(&key) {
                if let Some(status) = script.pop_front() {
                    return Err(CommerceApiError::api(
                        format!("{}.json", operation.resource_kind.plural()),
                        status,
                        "scripted failure",
                    ));
                }
            }
        }
        self.store.execute(operation).await
    }

    async fn list_resources(&self, kind: ResourceKind) -> CommerceResult<Vec<RecordData>> {
        if let Some(status) = *self.list_failure.lock() {
            return Err(CommerceApiError::api(format!("{}.json", kind.plural()), status, "listing failed"));
        }
        self.store.list_resources(kind).await
    }

    async fn submit_bulk_job(&self, kind: ResourceKind, records: &[RecordData]) -> CommerceResult<String> {
        self.store.submit_bulk_job(kind, records).await
    }

    async fn bulk_job_status(&self, job_id: &str) -> CommerceResult<BulkJobStatus> {
        self.store.bulk_job_status(job_id).await
    }

    async fn cancel_bulk_job(&self, job_id: &str) -> CommerceResult<()> {
        self.store.cancel_bulk_job(job_id).await
    }

    fn rate_limit_status(&self) -> Option<RateLimitSnapshot> {
        self.store.rate_limit_status()
    }
}

pub fn data(value: Value) -> RecordData {
    value.as_object().cloned().unwrap_or_default()
}

/// Raw POS product row
pub fn product_row(sku: &str, name: &str, price: Value) -> SourceRecord {
    SourceRecord::new(
        ResourceKind::Product,
        data(json!({"item_name": name, "sku_code": sku, "unit_price": price})),
    )
}

pub fn customer_row(email: &str, first_name: &str) -> SourceRecord {
    SourceRecord::new(
        ResourceKind::Customer,
        data(json!({"email_address": email, "first": first_name})),
    )
}

pub fn products(count: usize) -> Vec<SourceRecord> {
    (0..count)
        .map(|i| product_row(&format!("SKU-{i}"), &format!("Product {i}"), json!(format!("{}.00", i + 1))))
        .collect()
}

pub fn mappings() -> FieldMappings {
    FieldMappings::new(vec![
        FieldMapping::new("item_name", "title", 90),
        FieldMapping::new("sku_code", "sku", 95),
        FieldMapping::new("unit_price", "price", 85),
        FieldMapping::new("email_address", "email", 95),
        FieldMapping::new("first", "first_name", 80),
    ])
    .expect("valid mappings")
}

pub fn create_operations(count: usize) -> Vec<Operation> {
    (0..count)
        .map(|i| {
            Operation::create(
                ResourceKind::Product,
                data(json!({"title": format!("Product {i}"), "sku": format!("SKU-{i}")})),
            )
        })
        .collect()
}
