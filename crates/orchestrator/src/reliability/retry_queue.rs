//! FIFO queue of failed operations awaiting another attempt
//!
//! Entries are retried after `initial · 2^retry_count`; a failed retry goes
//! to the back of the queue. An entry that has used up its retries leaves
//! the queue as permanently failed, exactly once.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use commerce::CommerceApiError;
use common::RetryConfigBase;
use domain::Operation;

use super::backoff::BackoffStrategy;
use crate::error::is_retryable;

#[derive(Debug, Clone, Serialize)]
pub struct RetryEntry {
    pub operation: Operation,
    pub retry_count: u32,
    /// Every failure message seen for this operation, oldest first
    pub history: Vec<String>,
}

impl RetryEntry {
    pub fn last_error(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }
}

/// Why a retry attempt failed and whether another one makes sense
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub message: String,
    pub retryable: bool,
}

impl From<&CommerceApiError> for AttemptFailure {
    fn from(error: &CommerceApiError) -> Self {
        Self {
            message: error.to_string(),
            retryable: is_retryable(error),
        }
    }
}

/// Result of draining the queue
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainReport {
    pub recovered: Vec<RetryEntry>,
    pub permanent: Vec<RetryEntry>,
}

#[derive(Debug)]
pub struct RetryQueue {
    entries: Mutex<VecDeque<RetryEntry>>,
    max_retries: u32,
    backoff: BackoffStrategy,
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::from_config(&RetryConfigBase::default())
    }
}

impl RetryQueue {
    pub fn new(max_retries: u32, backoff: BackoffStrategy) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_retries,
            backoff,
        }
    }

    pub fn from_config(config: &RetryConfigBase) -> Self {
        Self::new(config.max_retries, BackoffStrategy::from_retry_config(config))
    }

    /// Enqueue with `retry_count = 0`
    pub fn add(&self, operation: Operation, error: impl Into<String>) {
        let error = error.into();
        debug!(operation = %operation.label(), error = %error, "operation queued for retry");
        self.entries.lock().push_back(RetryEntry {
            operation,
            retry_count: 0,
            history: vec![error],
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Copy of the pending entries in queue order
    pub fn pending(&self) -> Vec<RetryEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Process entries until the queue is empty or `cancel` fires
    pub async fn drain<F, Fut>(&self, mut execute: F, cancel: &CancellationToken) -> DrainReport
    where
        F: FnMut(Operation) -> Fut,
        Fut: Future<Output = Result<(), AttemptFailure>>,
    {
        let mut report = DrainReport::default();

        loop {
            if cancel.is_cancelled() {
                self.cancel_pending(&mut report);
                break;
            }

            let Some(mut entry) = self.entries.lock().pop_front() else {
                break;
            };

            if entry.retry_count >= self.max_retries {
                warn!(
                    operation = %entry.operation.label(),
                    retry_count = entry.retry_count,
                    "retries exhausted, operation failed permanently"
                );
                report.permanent.push(entry);
                continue;
            }

            let delay = self.backoff.calculate_delay(entry.retry_count);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    entry.history.push("cancelled".to_string());
                    report.permanent.push(entry);
                    self.cancel_pending(&mut report);
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match execute(entry.operation.clone()).await {
                Ok(()) => {
                    info!(
                        operation = %entry.operation.label(),
                        retry_count = entry.retry_count,
                        "operation recovered on retry"
                    );
                    report.recovered.push(entry);
                }
                Err(failure) => {
                    entry.retry_count += 1;
                    entry.history.push(failure.message);
                    if failure.retryable {
                        self.entries.lock().push_back(entry);
                    } else {
                        warn!(
                            operation = %entry.operation.label(),
                            retry_count = entry.retry_count,
                            "non-retryable failure during retry"
                        );
                        report.permanent.push(entry);
                    }
                }
            }
        }

        report
    }

    fn cancel_pending(&self, report: &mut DrainReport) {
        let mut entries = self.entries.lock();
        for mut entry in entries.drain(..) {
            entry.history.push("cancelled".to_string());
            report.permanent.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ResourceKind;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn op() -> Operation {
        Operation::create(ResourceKind::Product, Default::default())
    }

    fn transient(message: &str) -> AttemptFailure {
        AttemptFailure {
            message: message.to_string(),
            retryable: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_entry_is_reported_once_after_three_retries() {
        let queue = RetryQueue::default();
        let operation = op();
        queue.add(operation.clone(), "429 Too Many Requests");

        let attempts = Arc::new(SyncMutex::new(0u32));
        let counter = attempts.clone();
        let start = Instant::now();
        let report = queue
            .drain(
                move |_| {
                    *counter.lock() += 1;
                    async { Err(transient("429 Too Many Requests")) }
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(*attempts.lock(), 3);
        assert!(report.recovered.is_empty());
        assert_eq!(report.permanent.len(), 1);
        assert_eq!(report.permanent[0].operation.id, operation.id);
        assert_eq!(report.permanent[0].retry_count, 3);
        assert_eq!(report.permanent[0].history.len(), 4);
        // 1s + 2s + 4s
        assert!(start.elapsed() >= Duration::from_millis(7_000));
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_retry_goes_to_the_back() {
        let queue = RetryQueue::default();
        let first = op();
        let second = op();
        queue.add(first.clone(), "timeout");
        queue.add(second.clone(), "timeout");

        let order = Arc::new(SyncMutex::new(Vec::new()));
        let seen = order.clone();
        let first_id = first.id;
        let report = queue
            .drain(
                move |operation| {
                    seen.lock().push(operation.id);
                    let fail = operation.id == first_id && seen.lock().len() == 1;
                    async move {
                        if fail {
                            Err(transient("timeout"))
                        } else {
                            Ok(())
                        }
                    }
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(*order.lock(), vec![first.id, second.id, first.id]);
        assert_eq!(report.recovered.len(), 2);
        assert_eq!(report.recovered[1].retry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failure_is_permanent_immediately() {
        let queue = RetryQueue::default();
        queue.add(op(), "503 Service Unavailable");

        let report = queue
            .drain(
                |_| async {
                    Err(AttemptFailure {
                        message: "422 Unprocessable Entity".to_string(),
                        retryable: false,
                    })
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.permanent.len(), 1);
        assert_eq!(report.permanent[0].retry_count, 1);
        assert_eq!(report.permanent[0].last_error(), Some("422 Unprocessable Entity"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_drain_reports_pending_entries() {
        let queue = RetryQueue::default();
        queue.add(op(), "timeout");
        queue.add(op(), "timeout");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = queue.drain(|_| async { Ok(()) }, &cancel).await;

        assert!(report.recovered.is_empty());
        assert_eq!(report.permanent.len(), 2);
        assert!(report
            .permanent
            .iter()
            .all(|e| e.last_error() == Some("cancelled")));
        assert!(queue.is_empty());
    }
}
