//! The `CommerceApi` seam between the migration engine and the target store.

use async_trait::async_trait;
use domain::{Operation, RecordData, ResourceKind};

use crate::error::CommerceResult;
use crate::types::{BulkJobStatus, RateLimitSnapshot};

/// Target commerce API as seen by the migration engine
///
/// Implementations must be shareable across the tasks of one run.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Execute one create/update/delete and return the stored representation
    /// (empty for deletes)
    async fn execute(&self, operation: &Operation) -> CommerceResult<RecordData>;

    /// Every existing entity of a kind, following pagination
    async fn list_resources(&self, kind: ResourceKind) -> CommerceResult<Vec<RecordData>>;

    /// Submit one asynchronous import job; returns the job id
    async fn submit_bulk_job(&self, kind: ResourceKind, records: &[RecordData]) -> CommerceResult<String>;

    async fn bulk_job_status(&self, job_id: &str) -> CommerceResult<BulkJobStatus>;

    async fn cancel_bulk_job(&self, job_id: &str) -> CommerceResult<()>;

    /// Most recent quota reported by the API, if any call has reported one
    fn rate_limit_status(&self) -> Option<RateLimitSnapshot>;
}
