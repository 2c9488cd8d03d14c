use std::sync::Arc;

use native_db::Builder;

use crate::modules::database::USER_MODELS;
use crate::modules::error::code::ErrorCode;
use crate::modules::jobs::model::{JobFailureKind, JobMeta, JobStatus};
use crate::modules::jobs::nativedb::meta::NativeDbJobStore;
use crate::modules::jobs::result::JobRunResult;
use crate::modules::jobs::retry::{RetryPolicy, RetryStrategy};
use crate::raise_error;

fn in_memory_db() -> Arc<native_db::Database<'static>> {
    Arc::new(Builder::new().create_in_memory(&USER_MODELS).unwrap())
}

fn job(priority: u8, created_at: i64) -> JobMeta {
    let mut meta = JobMeta::new(
        "test_job".into(),
        "{}".into(),
        "test_queue".into(),
        "u-test".into(),
        priority,
        RetryPolicy {
            strategy: RetryStrategy::Exponential { base: 2 },
            max_retries: Some(3),
        },
        0,
    );
    meta.created_at = created_at;
    meta.next_run = 0;
    meta
}

#[tokio::test]
async fn dequeue_orders_by_priority_then_age() {
    let db = in_memory_db();
    NativeDbJobStore::store_one(&db, job(10, 1_000)).await.unwrap();
    let high = job(90, 3_000);
    let high_id = high.id;
    NativeDbJobStore::store_one(&db, high).await.unwrap();
    let old_high = job(90, 2_000);
    let old_high_id = old_high.id;
    NativeDbJobStore::store_one(&db, old_high).await.unwrap();

    let claimed = NativeDbJobStore::fetch_pending_for_user(&db).await.unwrap();
    let ids: Vec<u64> = claimed.iter().map(|job| job.id).collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], old_high_id);
    assert_eq!(ids[1], high_id);
    assert!(claimed
        .iter()
        .all(|job| job.status == JobStatus::InProgress && job.started_at.is_some()));
}

#[tokio::test]
async fn claimed_jobs_are_not_claimed_twice() {
    let db = in_memory_db();
    NativeDbJobStore::store_one(&db, job(50, 1_000)).await.unwrap();

    let first = NativeDbJobStore::fetch_pending_for_user(&db).await.unwrap();
    assert_eq!(first.len(), 1);
    let second = NativeDbJobStore::fetch_pending_for_user(&db).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn future_jobs_stay_queued_until_due() {
    let db = in_memory_db();
    let mut delayed = job(50, 1_000);
    delayed.next_run = i64::MAX;
    NativeDbJobStore::store_one(&db, delayed).await.unwrap();

    let claimed = NativeDbJobStore::fetch_pending_for_user(&db).await.unwrap();
    assert!(claimed.is_empty());
}

#[tokio::test]
async fn success_completes_with_full_progress() {
    let db = in_memory_db();
    let meta = job(50, 1_000);
    let job_id = meta.id;
    NativeDbJobStore::store_one(&db, meta).await.unwrap();
    NativeDbJobStore::fetch_pending_for_user(&db).await.unwrap();

    let result = JobRunResult::success(job_id, serde_json::json!({"processed": 3}), 25);
    NativeDbJobStore::write_execution_result(&db, job_id, &result)
        .await
        .unwrap();

    let stored = NativeDbJobStore::get(&db, job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.progress, 100);
    assert!(stored.completed_at.is_some());
    assert!(stored.results.unwrap().contains("processed"));
}

#[tokio::test]
async fn retriable_failure_requeues_with_next_run() {
    let db = in_memory_db();
    let meta = job(50, 1_000);
    let job_id = meta.id;
    NativeDbJobStore::store_one(&db, meta).await.unwrap();
    NativeDbJobStore::fetch_pending_for_user(&db).await.unwrap();

    let mut result = JobRunResult::failure(
        job_id,
        raise_error!("boom".into(), ErrorCode::InternalError),
        10,
    );
    result.retry_count = 1;
    result.next_run = Some(i64::MAX);
    NativeDbJobStore::write_execution_result(&db, job_id, &result)
        .await
        .unwrap();

    let stored = NativeDbJobStore::get(&db, job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.next_run, i64::MAX);
    assert_eq!(stored.retry_count, Some(1));
}

#[tokio::test]
async fn exhausted_failure_dead_letters() {
    let db = in_memory_db();
    let meta = job(50, 1_000);
    let job_id = meta.id;
    NativeDbJobStore::store_one(&db, meta).await.unwrap();
    NativeDbJobStore::fetch_pending_for_user(&db).await.unwrap();

    let mut result = JobRunResult::failure(
        job_id,
        raise_error!("boom".into(), ErrorCode::InternalError),
        10,
    );
    result.retry_count = 3;
    NativeDbJobStore::write_execution_result(&db, job_id, &result)
        .await
        .unwrap();

    let stored = NativeDbJobStore::get(&db, job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.failure_kind, Some(JobFailureKind::Exhausted));
}

#[tokio::test]
async fn timeout_failures_keep_their_kind() {
    let db = in_memory_db();
    let meta = job(50, 1_000);
    let job_id = meta.id;
    NativeDbJobStore::store_one(&db, meta).await.unwrap();
    NativeDbJobStore::fetch_pending_for_user(&db).await.unwrap();

    let mut result = JobRunResult::failure(
        job_id,
        raise_error!("budget elapsed".into(), ErrorCode::OperationTimeout),
        10,
    );
    result.failure_kind = Some(JobFailureKind::Timeout);
    NativeDbJobStore::write_execution_result(&db, job_id, &result)
        .await
        .unwrap();

    let stored = NativeDbJobStore::get(&db, job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.failure_kind, Some(JobFailureKind::Timeout));
}

#[tokio::test]
async fn cancel_flips_pending_jobs_immediately() {
    let db = in_memory_db();
    let meta = job(50, 1_000);
    let job_id = meta.id;
    NativeDbJobStore::store_one(&db, meta).await.unwrap();

    let status = NativeDbJobStore::request_cancel(&db, job_id).await.unwrap();
    assert_eq!(status, JobStatus::Cancelled);
}

#[tokio::test]
async fn cancel_flags_running_jobs_for_the_worker() {
    let db = in_memory_db();
    let meta = job(50, 1_000);
    let job_id = meta.id;
    NativeDbJobStore::store_one(&db, meta).await.unwrap();
    NativeDbJobStore::fetch_pending_for_user(&db).await.unwrap();

    let status = NativeDbJobStore::request_cancel(&db, job_id).await.unwrap();
    assert_eq!(status, JobStatus::InProgress);
    let stored = NativeDbJobStore::get(&db, job_id).await.unwrap().unwrap();
    assert!(stored.cancel_requested);

    // The worker reports the observation as a cancelled run.
    let result = JobRunResult::cancelled(job_id, 5);
    NativeDbJobStore::write_execution_result(&db, job_id, &result)
        .await
        .unwrap();
    let stored = NativeDbJobStore::get(&db, job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn terminal_jobs_cannot_be_cancelled() {
    let db = in_memory_db();
    let meta = job(50, 1_000);
    let job_id = meta.id;
    NativeDbJobStore::store_one(&db, meta).await.unwrap();
    NativeDbJobStore::fetch_pending_for_user(&db).await.unwrap();
    let result = JobRunResult::success(job_id, serde_json::Value::Null, 5);
    NativeDbJobStore::write_execution_result(&db, job_id, &result)
        .await
        .unwrap();

    assert!(NativeDbJobStore::request_cancel(&db, job_id).await.is_err());
}

#[tokio::test]
async fn progress_updates_persist_details() {
    let db = in_memory_db();
    let meta = job(50, 1_000);
    let job_id = meta.id;
    NativeDbJobStore::store_one(&db, meta).await.unwrap();

    NativeDbJobStore::set_progress(&db, job_id, 40, Some("{\"current_batch\":2}".into()))
        .await
        .unwrap();
    let stored = NativeDbJobStore::get(&db, job_id).await.unwrap().unwrap();
    assert_eq!(stored.progress, 40);
    assert_eq!(stored.progress_details.as_deref(), Some("{\"current_batch\":2}"));
}
