//! MigrationProgress - running tally of one migration run
//!
//! Invariant: `completed + failed <= total` after every mutation, and a
//! finished progress record always has `completed + failed == total`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::operation::Operation;
use crate::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl MigrationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationStatus::Completed | MigrationStatus::Failed)
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStatus::Pending => write!(f, "pending"),
            MigrationStatus::Running => write!(f, "running"),
            MigrationStatus::Completed => write!(f, "completed"),
            MigrationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Error taxonomy shared by every stage of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Record violates target-schema constraints; never retried
    Validation,
    /// Retryable external failure (429, 5xx, timeouts)
    Transient,
    /// Non-retryable external failure, or retries exhausted
    Permanent,
    /// Failure outside the per-operation boundary
    System,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::Permanent => write!(f, "permanent"),
            ErrorCategory::System => write!(f, "system"),
        }
    }
}

/// One entry of the error report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    /// Absent for synthetic errors (bulk job failures, stage aborts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    pub error_message: String,
    pub retry_count: u32,
    pub category: ErrorCategory,
    pub occurred_at: DateTime<Utc>,
}

impl OperationError {
    pub fn for_operation(operation: Operation, message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            operation: Some(operation),
            error_message: message.into(),
            retry_count: 0,
            category,
            occurred_at: Utc::now(),
        }
    }

    pub fn synthetic(message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            operation: None,
            error_message: message.into(),
            retry_count: 0,
            category,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn operation_id(&self) -> Option<Uuid> {
        self.operation.as_ref().map(|op| op.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MigrationProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub status: MigrationStatus,
    pub errors: Vec<OperationError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl MigrationProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Move to RUNNING and stamp the start time (first call only)
    pub fn start(&mut self) {
        if self.status == MigrationStatus::Pending {
            self.status = MigrationStatus::Running;
            self.started_at = Some(Utc::now());
        }
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed + self.failed)
    }

    pub fn is_reconciled(&self) -> bool {
        self.completed + self.failed == self.total
    }

    /// Percentage of records already accounted for (completed or failed)
    pub fn percent_processed(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed + self.failed) as f64 / self.total as f64 * 100.0
    }

    pub fn record_success(&mut self) -> DomainResult<()> {
        self.record_successes(1)
    }

    pub fn record_successes(&mut self, count: usize) -> DomainResult<()> {
        self.check_capacity(count)?;
        self.completed += count;
        Ok(())
    }

    pub fn record_failure(&mut self, error: OperationError) -> DomainResult<()> {
        self.check_capacity(1)?;
        self.failed += 1;
        self.errors.push(error);
        Ok(())
    }

    /// Account every remaining record as failed under one synthetic error
    pub fn fail_remaining(&mut self, error: OperationError) {
        let remaining = self.remaining();
        if remaining == 0 {
            return;
        }
        self.failed += remaining;
        self.errors.push(error);
    }

    /// A previously failed operation succeeded on retry: move it from
    /// failed to completed and drop its error entries
    pub fn recover(&mut self, operation_id: Uuid) -> bool {
        let before = self.errors.len();
        self.errors.retain(|e| e.operation_id() != Some(operation_id));
        if self.errors.len() == before || self.failed == 0 {
            return false;
        }
        self.failed -= 1;
        self.completed += 1;
        true
    }

    /// Update the error entry of an operation after its retries ran out
    pub fn mark_permanent(&mut self, operation_id: Uuid, retry_count: u32, message: impl Into<String>) {
        if let Some(entry) = self
            .errors
            .iter_mut()
            .find(|e| e.operation_id() == Some(operation_id))
        {
            entry.retry_count = retry_count;
            entry.category = ErrorCategory::Permanent;
            entry.error_message = message.into();
        }
    }

    /// Fold a stage-level progress into this run-level one
    pub fn absorb(&mut self, stage: &MigrationProgress) -> DomainResult<()> {
        self.check_capacity(stage.completed + stage.failed)?;
        self.completed += stage.completed;
        self.failed += stage.failed;
        self.errors.extend(stage.errors.iter().cloned());
        Ok(())
    }

    /// Enter a terminal status. Records never accounted for are reported as
    /// failed so the final tally always reconciles with `total`.
    pub fn finish(&mut self, status: MigrationStatus) {
        let unaccounted = self.remaining();
        if unaccounted > 0 {
            self.fail_remaining(OperationError::synthetic(
                format!("{unaccounted} records were not processed"),
                ErrorCategory::System,
            ));
        }
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock duration of the run, when both ends are known
    pub fn duration_seconds(&self) -> Option<f64> {
        let (start, end) = (self.started_at?, self.finished_at?);
        Some((end - start).num_milliseconds().max(0) as f64 / 1000.0)
    }

    fn check_capacity(&self, additional: usize) -> DomainResult<()> {
        if self.completed + self.failed + additional > self.total {
            return Err(DomainError::ProgressOverflow {
                total: self.total,
                completed: self.completed,
                failed: self.failed + additional,
            });
        }
        Ok(())
    }
}
