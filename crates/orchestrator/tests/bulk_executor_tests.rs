use async_trait::async_trait;
use mockall::mock;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use commerce::{BulkJobState, BulkJobStatus, CommerceApi, CommerceApiError, CommerceResult, RateLimitSnapshot};
use common::BulkConfigBase;
use domain::{ErrorCategory, MigrationStatus, Operation, RecordData, ResourceKind};
use orchestrator::BulkExecutor;

mock! {
    Api {}

    #[async_trait]
    impl CommerceApi for Api {
        async fn execute(&self, operation: &Operation) -> CommerceResult<RecordData>;
        async fn list_resources(&self, kind: ResourceKind) -> CommerceResult<Vec<RecordData>>;
        async fn submit_bulk_job(&self, kind: ResourceKind, records: &[RecordData]) -> CommerceResult<String>;
        async fn bulk_job_status(&self, job_id: &str) -> CommerceResult<BulkJobStatus>;
        async fn cancel_bulk_job(&self, job_id: &str) -> CommerceResult<()>;
        fn rate_limit_status(&self) -> Option<RateLimitSnapshot>;
    }
}

const JOB_ID: &str = "gid://shop/BulkOperation/1";

fn records(count: usize) -> Vec<RecordData> {
    (0..count)
        .map(|i| json!({"title": format!("P{i}"), "sku": format!("S{i}")}).as_object().cloned().unwrap_or_default())
        .collect()
}

fn status(state: BulkJobState, error_code: Option<&str>) -> BulkJobStatus {
    BulkJobStatus {
        id: JOB_ID.to_string(),
        status: state,
        error_code: error_code.map(str::to_string),
        object_count: 0,
    }
}

fn accepting_api() -> MockApi {
    let mut api = MockApi::new();
    api.expect_submit_bulk_job()
        .times(1)
        .returning(|_, _| Ok(JOB_ID.to_string()));
    api
}

#[tokio::test(start_paused = true)]
async fn test_job_completes_after_polling() {
    let mut api = accepting_api();
    let polls = Arc::new(AtomicU32::new(0));
    let counter = polls.clone();
    api.expect_bulk_job_status().returning(move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Ok(if n < 2 {
            status(BulkJobState::Running, None)
        } else {
            status(BulkJobState::Completed, None)
        })
    });
    api.expect_cancel_bulk_job().never();

    let started = Instant::now();
    let progress = BulkExecutor::new(Arc::new(api), BulkConfigBase::default())
        .run_bulk(ResourceKind::Product, &records(3), &CancellationToken::new())
        .await;

    assert_eq!(progress.status, MigrationStatus::Completed);
    assert_eq!(progress.completed, 3);
    assert_eq!(polls.load(Ordering::SeqCst), 3);
    // three polls at the fixed 5 s interval
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_millis(15_100));
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_records_one_error_with_the_remote_code() {
    let mut api = accepting_api();
    api.expect_bulk_job_status()
        .returning(|_| Ok(status(BulkJobState::Failed, Some("INTERNAL_SERVER_ERROR"))));

    let progress = BulkExecutor::new(Arc::new(api), BulkConfigBase::default())
        .run_bulk(ResourceKind::Customer, &records(4), &CancellationToken::new())
        .await;

    assert_eq!(progress.status, MigrationStatus::Failed);
    assert_eq!(progress.failed, 4);
    assert_eq!(progress.completed, 0);
    assert_eq!(progress.errors.len(), 1);
    assert_eq!(progress.errors[0].category, ErrorCategory::Permanent);
    assert!(progress.errors[0].error_message.contains("INTERNAL_SERVER_ERROR"));
}

#[tokio::test(start_paused = true)]
async fn test_polling_gives_up_after_the_maximum_duration() {
    let mut api = accepting_api();
    api.expect_bulk_job_status()
        .returning(|_| Ok(status(BulkJobState::Running, None)));
    api.expect_cancel_bulk_job()
        .times(1)
        .returning(|_| Ok(()));

    let config = BulkConfigBase {
        max_poll_duration_ms: 60_000,
        ..BulkConfigBase::default()
    };
    let started = Instant::now();
    let progress = BulkExecutor::new(Arc::new(api), config)
        .run_bulk(ResourceKind::Order, &records(2), &CancellationToken::new())
        .await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(60) && elapsed < Duration::from_millis(60_100));
    assert_eq!(progress.status, MigrationStatus::Failed);
    assert_eq!(progress.failed, 2);
    assert_eq!(progress.errors[0].category, ErrorCategory::System);
    assert!(progress.errors[0].error_message.contains("did not finish within 60s"));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_cancels_the_remote_job() {
    let mut api = accepting_api();
    api.expect_bulk_job_status()
        .returning(|_| Ok(status(BulkJobState::Running, None)));
    api.expect_cancel_bulk_job()
        .times(1)
        .returning(|_| Err(CommerceApiError::api("graphql.json", 500, "already finishing")));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        trigger.cancel();
    });

    let progress = BulkExecutor::new(Arc::new(api), BulkConfigBase::default())
        .run_bulk(ResourceKind::Product, &records(5), &cancel)
        .await;

    assert_eq!(progress.status, MigrationStatus::Failed);
    assert_eq!(progress.failed, 5);
    assert!(progress.errors[0].error_message.contains("cancelled"));
}

#[tokio::test(start_paused = true)]
async fn test_poll_errors_back_off_until_the_job_answers() {
    let mut api = accepting_api();
    let polls = Arc::new(AtomicU32::new(0));
    let counter = polls.clone();
    api.expect_bulk_job_status().returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 3 {
            Err(CommerceApiError::Timeout {
                endpoint: "graphql.json".into(),
                elapsed_ms: 30_000,
            })
        } else {
            Ok(status(BulkJobState::Completed, None))
        }
    });

    let started = Instant::now();
    let progress = BulkExecutor::new(Arc::new(api), BulkConfigBase::default())
        .run_bulk(ResourceKind::Inventory, &records(2), &CancellationToken::new())
        .await;

    assert_eq!(progress.status, MigrationStatus::Completed);
    assert_eq!(polls.load(Ordering::SeqCst), 4);
    // 5 s first poll, then 500 + 1000 + 2000 ms of backoff with ±25 % jitter
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(7_600), "elapsed {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(9_400), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_submission_error_fails_every_record() {
    let mut api = MockApi::new();
    api.expect_submit_bulk_job()
        .returning(|_, _| Err(CommerceApiError::api("graphql.json", 503, "Service Unavailable")));
    api.expect_bulk_job_status().never();

    let progress = BulkExecutor::new(Arc::new(api), BulkConfigBase::default())
        .run_bulk(ResourceKind::Product, &records(3), &CancellationToken::new())
        .await;

    assert_eq!(progress.status, MigrationStatus::Failed);
    assert_eq!(progress.failed, 3);
    assert_eq!(progress.errors[0].category, ErrorCategory::Transient);
}

#[tokio::test]
async fn test_empty_record_set_submits_nothing() {
    let mut api = MockApi::new();
    api.expect_submit_bulk_job().never();

    let progress = BulkExecutor::new(Arc::new(api), BulkConfigBase::default())
        .run_bulk(ResourceKind::Product, &[], &CancellationToken::new())
        .await;

    assert_eq!(progress.status, MigrationStatus::Completed);
    assert_eq!(progress.total, 0);
}
