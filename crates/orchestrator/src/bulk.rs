//! Bulk executor: one asynchronous bulk job per resource
//!
//! The job is polled at a fixed interval until it reaches a terminal state,
//! the maximum poll duration elapses or the run is cancelled. Consecutive
//! poll errors back off exponentially with jitter.

use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use commerce::{BulkJobState, CommerceApi};
use common::BulkConfigBase;
use domain::{ErrorCategory, MigrationProgress, MigrationStatus, OperationError, RecordData, ResourceKind};

use crate::error::classify;
use crate::reliability::BackoffStrategy;

pub struct BulkExecutor {
    api: Arc<dyn CommerceApi>,
    config: BulkConfigBase,
    error_backoff: BackoffStrategy,
}

impl BulkExecutor {
    pub fn new(api: Arc<dyn CommerceApi>, config: BulkConfigBase) -> Self {
        let error_backoff = BackoffStrategy::from_bulk_config(&config);
        Self {
            api,
            config,
            error_backoff,
        }
    }

    pub async fn run_bulk(
        &self,
        resource: ResourceKind,
        records: &[RecordData],
        cancel: &CancellationToken,
    ) -> MigrationProgress {
        let mut progress = MigrationProgress::new(records.len());
        progress.start();

        if records.is_empty() {
            progress.finish(MigrationStatus::Completed);
            return progress;
        }

        let job_id = match self.api.submit_bulk_job(resource, records).await {
            Ok(job_id) => job_id,
            Err(e) => {
                error!(%resource, error = %e, "bulk job submission failed");
                progress.fail_remaining(OperationError::synthetic(
                    format!("bulk {resource} submission failed: {e}"),
                    classify(&e),
                ));
                progress.finish(MigrationStatus::Failed);
                return progress;
            }
        };
        info!(%resource, job_id = %job_id, records = records.len(), "bulk job submitted");

        let max_poll_duration = self.config.max_poll_duration();
        let deadline = Instant::now() + max_poll_duration;
        let mut consecutive_errors: u32 = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let message = format!(
                    "bulk job {job_id} did not finish within {}s",
                    max_poll_duration.as_secs()
                );
                return self.abandon(&job_id, progress, message).await;
            }

            let wait = if consecutive_errors == 0 {
                self.config.poll_interval()
            } else {
                self.error_backoff.calculate_delay(consecutive_errors - 1)
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let message = format!("bulk job {job_id} cancelled");
                    return self.abandon(&job_id, progress, message).await;
                }
                _ = tokio::time::sleep(wait.min(remaining)) => {}
            }

            match self.api.bulk_job_status(&job_id).await {
                Ok(status) => {
                    consecutive_errors = 0;
                    match status.status {
                        BulkJobState::Completed => {
                            let remaining_records = progress.remaining();
                            if let Err(e) = progress.record_successes(remaining_records) {
                                error!(error = %e, "bulk progress out of range");
                            }
                            info!(%resource, job_id = %job_id, objects = status.object_count, "bulk job completed");
                            progress.finish(MigrationStatus::Completed);
                            return progress;
                        }
                        BulkJobState::Failed | BulkJobState::Canceled | BulkJobState::Expired => {
                            let code = status.error_code.unwrap_or_else(|| "UNKNOWN".to_string());
                            warn!(%resource, job_id = %job_id, state = %status.status, code = %code, "bulk job failed");
                            progress.fail_remaining(OperationError::synthetic(
                                format!("bulk job {job_id} ended {}: {code}", status.status),
                                ErrorCategory::Permanent,
                            ));
                            progress.finish(MigrationStatus::Failed);
                            return progress;
                        }
                        state => {
                            debug!(job_id = %job_id, %state, objects = status.object_count, "bulk job still running");
                        }
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(job_id = %job_id, error = %e, consecutive_errors, "bulk status poll failed");
                }
            }
        }
    }

    /// Best-effort cancel of the remote job, then fail the run
    async fn abandon(
        &self,
        job_id: &str,
        mut progress: MigrationProgress,
        message: String,
    ) -> MigrationProgress {
        if let Err(e) = self.api.cancel_bulk_job(job_id).await {
            warn!(job_id, error = %e, "could not cancel bulk job");
        }
        error!(job_id, reason = %message, "bulk run abandoned");
        progress.fail_remaining(OperationError::synthetic(message, ErrorCategory::System));
        progress.finish(MigrationStatus::Failed);
        progress
    }
}
