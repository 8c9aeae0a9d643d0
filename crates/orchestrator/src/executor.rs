//! Batch executor: rate-limited batches of individual API calls
//!
//! Batch size shrinks with the remaining rate-limit headroom. Every batch
//! costs one throttle credit and runs its operations concurrently on the
//! current task; one failing operation never aborts the others.

use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use commerce::CommerceApi;
use common::BatchConfigBase;
use domain::{ErrorCategory, MigrationProgress, MigrationStatus, Operation, OperationError};

use crate::error::{classify, MigrationResult};
use crate::reliability::{AttemptFailure, DrainReport, RateLimiter, RetryQueue};

/// Called with the running tally after every batch
pub type BatchObserver = Arc<dyn Fn(&MigrationProgress) + Send + Sync>;

pub struct BatchExecutor {
    api: Arc<dyn CommerceApi>,
    rate_limiter: Arc<RateLimiter>,
    retry_queue: Arc<RetryQueue>,
    max_batch_size: usize,
    observer: Option<BatchObserver>,
}

impl BatchExecutor {
    pub fn new(
        api: Arc<dyn CommerceApi>,
        rate_limiter: Arc<RateLimiter>,
        retry_queue: Arc<RetryQueue>,
        config: &BatchConfigBase,
    ) -> Self {
        Self {
            api,
            rate_limiter,
            retry_queue,
            max_batch_size: config.max_batch_size.max(1),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: BatchObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn retry_queue(&self) -> &Arc<RetryQueue> {
        &self.retry_queue
    }

    /// `max(1, floor(max_batch_size · available / capacity))`
    pub fn batch_size(&self) -> usize {
        let available = self.rate_limiter.available_credits() as usize;
        let capacity = self.rate_limiter.capacity().max(1) as usize;
        (self.max_batch_size * available / capacity).max(1)
    }

    pub async fn run(
        &self,
        operations: Vec<Operation>,
        cancel: &CancellationToken,
    ) -> MigrationResult<MigrationProgress> {
        let mut progress = MigrationProgress::new(operations.len());
        progress.start();
        let mut pending: VecDeque<Operation> = operations.into();
        let mut batch_number = 0usize;

        while !pending.is_empty() {
            if cancel.is_cancelled() {
                warn!(not_executed = pending.len(), "batch run cancelled");
                for operation in pending.drain(..) {
                    progress.record_failure(OperationError::for_operation(
                        operation,
                        "cancelled before execution",
                        ErrorCategory::System,
                    ))?;
                }
                progress.finish(MigrationStatus::Failed);
                return Ok(progress);
            }

            let size = self.batch_size().min(pending.len());
            let batch: Vec<Operation> = pending.drain(..size).collect();
            batch_number += 1;

            self.rate_limiter.throttle().await;
            let results = join_all(batch.iter().map(|operation| self.api.execute(operation))).await;

            for (operation, result) in batch.into_iter().zip(results) {
                match result {
                    Ok(_) => progress.record_success()?,
                    Err(error) => {
                        let category = classify(&error);
                        let message = error.to_string();
                        debug!(operation = %operation.label(), error = %message, ?category, "operation failed");
                        if category == ErrorCategory::Transient {
                            self.retry_queue.add(operation.clone(), message.clone());
                        }
                        progress.record_failure(OperationError::for_operation(operation, message, category))?;
                    }
                }
            }

            if let Some(quota) = self.api.rate_limit_status() {
                self.rate_limiter.sync_from_quota(quota.used, quota.capacity);
            }

            info!(
                batch = batch_number,
                size,
                completed = progress.completed,
                failed = progress.failed,
                credits = self.rate_limiter.available_credits(),
                "batch executed"
            );

            if let Some(observer) = &self.observer {
                observer(&progress);
            }
        }

        progress.finish(MigrationStatus::Completed);
        Ok(progress)
    }

    /// Drain the retry queue through the same per-operation path.
    /// Recovered operations move from failed to completed; the rest keep
    /// their error entry with the final retry count.
    pub async fn retry_failed(
        &self,
        progress: &mut MigrationProgress,
        cancel: &CancellationToken,
    ) -> DrainReport {
        if self.retry_queue.is_empty() {
            return DrainReport::default();
        }
        info!(queued = self.retry_queue.len(), "retrying failed operations");

        let report = self
            .retry_queue
            .drain(
                |operation| {
                    let api = self.api.clone();
                    let rate_limiter = self.rate_limiter.clone();
                    async move {
                        rate_limiter.throttle().await;
                        let result = api.execute(&operation).await;
                        if let Some(quota) = api.rate_limit_status() {
                            rate_limiter.sync_from_quota(quota.used, quota.capacity);
                        }
                        result.map(|_| ()).map_err(|e| AttemptFailure::from(&e))
                    }
                },
                cancel,
            )
            .await;

        for entry in &report.recovered {
            progress.recover(entry.operation.id);
        }
        for entry in &report.permanent {
            let last = entry.last_error().unwrap_or("unknown error");
            progress.mark_permanent(
                entry.operation.id,
                entry.retry_count,
                format!("{last} (gave up after {} retries)", entry.retry_count),
            );
        }

        info!(
            recovered = report.recovered.len(),
            permanent = report.permanent.len(),
            completed = progress.completed,
            failed = progress.failed,
            "retry pass finished"
        );
        report
    }
}
