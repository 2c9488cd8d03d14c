// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;
use std::time::Instant;

use itertools::Itertools;
use native_db::Database;
use tracing::{debug, warn};

use crate::{
    modules::{
        database::{
            batch_delete_impl, batch_update_impl, insert_impl, manager::DB_MANAGER,
            secondary_find_impl, update_impl,
        },
        error::{code::ErrorCode, MailSweepResult},
        jobs::{
            model::{JobFailureKind, JobMeta, JobStatus},
            nativedb::{JobEntity, JobEntityKey},
            result::JobRunResult,
            store::JobStore,
        },
        metrics::{MAILSWEEP_JOB_FETCH_DURATION, MAILSWEEP_JOB_QUEUE_LENGTH},
        settings::cli::SETTINGS,
        user::entity::User,
    },
    raise_error, utc_now,
};

const HOUR_TO_MS: i64 = 60 * 60 * 1000;
const FETCH_LIMIT_PER_USER: usize = 100;

/// Job store over the per-user databases. The rows are the queue; the
/// in-memory dispatch downstream is only a cache of what is claimed here.
#[derive(Clone, Default)]
pub struct NativeDbJobStore;

impl NativeDbJobStore {
    pub fn init() -> Self {
        Self
    }

    /// Claims due pending jobs for one user: highest priority first, FIFO
    /// within a priority, marked in-progress inside the same transaction.
    pub async fn fetch_pending_for_user(
        database: &Arc<Database<'static>>,
    ) -> MailSweepResult<Vec<JobMeta>> {
        let claimed: Vec<JobEntity> = batch_update_impl(
            database,
            |rw| {
                let candidates: Vec<JobEntity> = rw
                    .scan()
                    .secondary(JobEntityKey::status)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .start_with(JobStatus::Pending.code())
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .try_collect()
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

                let now = utc_now!();
                let mut due: Vec<JobEntity> = candidates
                    .into_iter()
                    .filter(|job| job.next_run <= now)
                    .collect();
                due.sort_by(|a, b| {
                    b.priority
                        .cmp(&a.priority)
                        .then(a.created_at.cmp(&b.created_at))
                });
                due.truncate(FETCH_LIMIT_PER_USER);
                Ok(due)
            },
            move |jobs| {
                let mut result = Vec::new();
                for entity in jobs.iter() {
                    let mut updated = entity.clone();
                    updated.status = JobStatus::InProgress;
                    updated.started_at = Some(utc_now!());
                    updated.updated_at = utc_now!();
                    result.push((entity.clone(), updated));
                }
                Ok(result)
            },
        )
        .await?;
        Ok(claimed.into_iter().map(Into::into).collect())
    }

    pub async fn get(
        database: &Arc<Database<'static>>,
        job_id: u64,
    ) -> MailSweepResult<Option<JobMeta>> {
        secondary_find_impl::<JobEntity>(database, JobEntityKey::id, job_id)
            .await
            .map(|opt| opt.map(Into::into))
    }

    pub async fn store_one(
        database: &Arc<Database<'static>>,
        job: JobMeta,
    ) -> MailSweepResult<()> {
        let entity: JobEntity = job.into();
        insert_impl(database, entity).await
    }

    pub async fn set_progress(
        database: &Arc<Database<'static>>,
        job_id: u64,
        progress: u8,
        details: Option<String>,
    ) -> MailSweepResult<()> {
        update_impl(
            database,
            move |rw| {
                rw.get()
                    .secondary::<JobEntity>(JobEntityKey::id, job_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Job '{job_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.progress = progress;
                updated.progress_details = details.clone();
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    /// Requests cancellation: a pending job flips straight to cancelled, a
    /// running job gets the flag and the worker observes it at the next
    /// batch boundary.
    pub async fn request_cancel(
        database: &Arc<Database<'static>>,
        job_id: u64,
    ) -> MailSweepResult<JobStatus> {
        let updated = update_impl(
            database,
            move |rw| {
                rw.get()
                    .secondary::<JobEntity>(JobEntityKey::id, job_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Job '{job_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| match current.status {
                JobStatus::Pending => {
                    let mut updated = current.clone();
                    updated.status = JobStatus::Cancelled;
                    updated.cancel_requested = true;
                    updated.completed_at = Some(utc_now!());
                    updated.updated_at = utc_now!();
                    Ok(updated)
                }
                JobStatus::InProgress => {
                    let mut updated = current.clone();
                    updated.cancel_requested = true;
                    updated.updated_at = utc_now!();
                    Ok(updated)
                }
                status => Err(raise_error!(
                    format!("Job '{job_id}' is already {status} and cannot be cancelled"),
                    ErrorCode::Conflict
                )),
            },
        )
        .await?;
        Ok(updated.status)
    }

    pub(crate) async fn write_execution_result(
        database: &Arc<Database<'static>>,
        job_id: u64,
        result: &JobRunResult,
    ) -> MailSweepResult<()> {
        let is_success = result.is_success();
        let cancelled = result.cancelled;
        let retry_count = result.retry_count;
        let last_duration_ms = result.last_duration_ms;
        let next_run = result.next_run;
        let failure_kind = result.failure_kind;
        let results_json = match &result.result {
            Ok(value) if !value.is_null() => Some(value.to_string()),
            _ => None,
        };
        let last_error = match &result.result {
            Ok(_) => None,
            Err(e) => Some(e.to_string()),
        };

        update_impl(
            database,
            move |rw| {
                rw.get()
                    .secondary::<JobEntity>(JobEntityKey::id, job_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Job '{job_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.last_duration_ms = Some(last_duration_ms);
                updated.retry_count = Some(retry_count);
                updated.updated_at = utc_now!();
                if cancelled {
                    updated.status = JobStatus::Cancelled;
                    updated.completed_at = Some(utc_now!());
                } else if is_success {
                    updated.status = JobStatus::Completed;
                    updated.progress = 100;
                    updated.results = results_json.clone();
                    updated.completed_at = Some(utc_now!());
                } else {
                    updated.last_error = last_error.clone();
                    match next_run {
                        Some(next_run) => {
                            updated.status = JobStatus::Pending;
                            updated.next_run = next_run;
                            updated.started_at = None;
                        }
                        None => {
                            updated.status = JobStatus::Failed;
                            updated.completed_at = Some(utc_now!());
                            updated.failure_kind = match failure_kind {
                                Some(JobFailureKind::Timeout) => Some(JobFailureKind::Timeout),
                                _ => Some(JobFailureKind::Exhausted),
                            };
                        }
                    }
                }
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    /// Reschedules jobs found in-progress after a restart: within retry
    /// budget they go back to pending, beyond it they are dead-lettered.
    pub async fn restore() -> MailSweepResult<()> {
        tracing::info!("starting job restore...");
        for user in User::list(false).await? {
            let database = DB_MANAGER.user_db(&user.user_id).await?;
            let restored = batch_update_impl(
                &database,
                |rw| {
                    let running: Vec<JobEntity> = rw
                        .scan()
                        .secondary(JobEntityKey::status)
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                        .start_with(JobStatus::InProgress.code())
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                        .try_collect()
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
                    Ok(running)
                },
                |jobs| {
                    let mut pairs = Vec::new();
                    for job in jobs.iter() {
                        let mut updated = job.clone();
                        let exhausted = job
                            .retry_count
                            .map(|count| count >= job.max_retries.unwrap_or(0) as usize)
                            .unwrap_or(false);
                        if exhausted {
                            updated.status = JobStatus::Failed;
                            updated.failure_kind = Some(JobFailureKind::Exhausted);
                            updated.last_error = Some(
                                "Max retries exceeded, dead-lettered during job restoration".into(),
                            );
                            updated.completed_at = Some(utc_now!());
                        } else {
                            updated.status = JobStatus::Pending;
                            updated.started_at = None;
                        }
                        updated.updated_at = utc_now!();
                        pairs.push((job.clone(), updated));
                    }
                    Ok(pairs)
                },
            )
            .await?;
            if !restored.is_empty() {
                tracing::info!(
                    "Restored {} interrupted jobs for '{}'",
                    restored.len(),
                    user.user_id
                );
            }
        }
        tracing::info!("finished job restore.");
        Ok(())
    }

    pub async fn clean_up_user(database: &Arc<Database<'static>>) -> MailSweepResult<()> {
        let retention_ms = SETTINGS.mailsweep_job_retention_hours as i64 * HOUR_TO_MS;
        let cutoff = utc_now!() - retention_ms;
        batch_delete_impl(database, move |rw| {
            let stale: Vec<JobEntity> = rw
                .scan()
                .primary()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .all()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .filter_map(Result::ok)
                .filter(|job: &JobEntity| job.status.is_terminal() && job.updated_at < cutoff)
                .collect();
            Ok(stale)
        })
        .await?;
        Ok(())
    }
}

impl JobStore for NativeDbJobStore {
    async fn store_job(&self, job: JobMeta) -> MailSweepResult<()> {
        let database = DB_MANAGER.user_db(&job.user_id).await?;
        Self::store_one(&database, job).await
    }

    async fn fetch_pending_jobs(&self) -> MailSweepResult<Vec<JobMeta>> {
        let start = Instant::now();
        let mut claimed = Vec::new();
        for user_id in DB_MANAGER.open_users() {
            let database = match DB_MANAGER.user_db(&user_id).await {
                Ok(database) => database,
                Err(e) => {
                    warn!("Skipping queue poll for '{user_id}': {e:?}");
                    continue;
                }
            };
            match Self::fetch_pending_for_user(&database).await {
                Ok(jobs) => claimed.extend(jobs),
                Err(e) => warn!("Queue poll failed for '{user_id}': {e:?}"),
            }
        }

        let mut by_queue: std::collections::HashMap<&str, i64> = Default::default();
        for job in &claimed {
            *by_queue.entry(job.queue_name.as_str()).or_default() += 1;
        }
        for (queue, count) in by_queue {
            MAILSWEEP_JOB_QUEUE_LENGTH
                .with_label_values(&[queue])
                .set(count);
        }

        let elapsed = start.elapsed();
        MAILSWEEP_JOB_FETCH_DURATION.observe(elapsed.as_secs_f64());
        debug!("Time taken to fetch jobs from native_db: {:#?}", elapsed);
        Ok(claimed)
    }

    async fn update_execution_result(
        &self,
        job: &JobMeta,
        result: &JobRunResult,
    ) -> MailSweepResult<()> {
        let database = DB_MANAGER.user_db(&job.user_id).await?;
        Self::write_execution_result(&database, job.id, result).await
    }

    async fn update_progress(
        &self,
        user_id: &str,
        job_id: u64,
        progress: u8,
        details: Option<String>,
    ) -> MailSweepResult<()> {
        let database = DB_MANAGER.user_db(user_id).await?;
        Self::set_progress(&database, job_id, progress, details).await
    }

    async fn heartbeat(&self, user_id: &str, job_id: u64) -> MailSweepResult<()> {
        let database = DB_MANAGER.user_db(user_id).await?;
        update_impl(
            &database,
            move |rw| {
                rw.get()
                    .secondary::<JobEntity>(JobEntityKey::id, job_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Job '{job_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.heartbeat_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    async fn cleanup(&self) -> MailSweepResult<()> {
        for user_id in DB_MANAGER.open_users() {
            let database = DB_MANAGER.user_db(&user_id).await?;
            Self::clean_up_user(&database).await?;
        }
        Ok(())
    }
}
