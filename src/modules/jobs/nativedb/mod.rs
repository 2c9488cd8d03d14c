use crate::modules::jobs::model::{JobFailureKind, JobMeta, JobStatus, Retry};
use crate::modules::{
    database::{count_primary_filter_impl, scan_primary_filter_impl},
    error::MailSweepResult,
};
use native_db::*;
use native_model::native_model;
use native_model::Model;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod meta;

/// Durable form of `JobMeta`, one table per user database. The primary key
/// leads with the creation timestamp so scans iterate in time order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 12, version = 1)]
#[native_db(
    primary_key(pk -> String),
    secondary_key(typed_status -> String),
    secondary_key(status -> u32)
)]
pub struct JobEntity {
    #[secondary_key(unique)]
    pub id: u64,
    #[secondary_key]
    pub job_key: String,
    pub params: String,
    #[secondary_key]
    pub queue_name: String,
    pub user_id: String,
    pub status: JobStatus,
    pub priority: u8,
    pub progress: u8,
    pub progress_details: Option<String>,
    pub results: Option<String>,
    pub last_error: Option<String>,
    pub failure_kind: Option<JobFailureKind>,
    pub cancel_requested: bool,
    pub last_duration_ms: Option<usize>,
    pub retry_count: Option<usize>,
    pub next_run: i64,
    pub retry_strategy: Retry,
    pub retry_interval: u32,
    pub base_interval: u32,
    pub delay_seconds: u32,
    pub max_retries: Option<u32>,
    pub heartbeat_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl JobEntity {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    pub fn status(&self) -> u32 {
        self.status.code()
    }

    pub fn typed_status(&self) -> String {
        format!("{}_{}", &self.job_key, self.status.code())
    }

    pub fn status_filter_key(job_key: &str, status: JobStatus) -> String {
        format!("{}_{}", job_key, status.code())
    }

    pub async fn count_by_status(
        database: &Arc<Database<'static>>,
        status: JobStatus,
    ) -> MailSweepResult<usize> {
        count_primary_filter_impl::<JobEntity>(database, move |job| job.status == status).await
    }

    /// Newest first, with optional type/status filters.
    pub async fn list_filtered(
        database: &Arc<Database<'static>>,
        job_key: Option<String>,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> MailSweepResult<Vec<JobEntity>> {
        let mut jobs = scan_primary_filter_impl::<JobEntity>(database, move |job| {
            if let Some(job_key) = &job_key {
                if &job.job_key != job_key {
                    return false;
                }
            }
            if let Some(status) = status {
                if job.status != status {
                    return false;
                }
            }
            true
        })
        .await?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }
}

impl From<JobEntity> for JobMeta {
    fn from(entity: JobEntity) -> Self {
        JobMeta {
            id: entity.id,
            job_key: entity.job_key,
            params: entity.params,
            queue_name: entity.queue_name,
            user_id: entity.user_id,
            status: entity.status,
            priority: entity.priority,
            progress: entity.progress,
            progress_details: entity.progress_details,
            results: entity.results,
            last_error: entity.last_error,
            failure_kind: entity.failure_kind,
            cancel_requested: entity.cancel_requested,
            last_duration_ms: entity.last_duration_ms,
            retry_count: entity.retry_count,
            next_run: entity.next_run,
            retry_strategy: entity.retry_strategy,
            retry_interval: entity.retry_interval,
            base_interval: entity.base_interval,
            delay_seconds: entity.delay_seconds,
            max_retries: entity.max_retries,
            heartbeat_at: entity.heartbeat_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            started_at: entity.started_at,
            completed_at: entity.completed_at,
        }
    }
}

impl From<JobMeta> for JobEntity {
    fn from(meta: JobMeta) -> Self {
        JobEntity {
            id: meta.id,
            job_key: meta.job_key,
            params: meta.params,
            queue_name: meta.queue_name,
            user_id: meta.user_id,
            status: meta.status,
            priority: meta.priority,
            progress: meta.progress,
            progress_details: meta.progress_details,
            results: meta.results,
            last_error: meta.last_error,
            failure_kind: meta.failure_kind,
            cancel_requested: meta.cancel_requested,
            last_duration_ms: meta.last_duration_ms,
            retry_count: meta.retry_count,
            next_run: meta.next_run,
            retry_strategy: meta.retry_strategy,
            retry_interval: meta.retry_interval,
            base_interval: meta.base_interval,
            delay_seconds: meta.delay_seconds,
            max_retries: meta.max_retries,
            heartbeat_at: meta.heartbeat_at,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            started_at: meta.started_at,
            completed_at: meta.completed_at,
        }
    }
}
