// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;

use crate::modules::categorize::task::{CategorizeJob, CATEGORIZE_QUEUE};
use crate::modules::cleanup::task::{CleanupJob, CLEANUP_QUEUE};
use crate::modules::common::Initialize;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailSweepResult;
use crate::modules::jobs::cleaner::JobCleaner;
use crate::modules::jobs::flow::JobFlow;
use crate::modules::jobs::handlers::JobHandlers;
use crate::modules::jobs::model::{JobMeta, JobStatus};
use crate::modules::jobs::nativedb::meta::NativeDbJobStore;
use crate::modules::jobs::nativedb::JobEntity;
use crate::modules::jobs::running_jobs;
use crate::modules::jobs::task::Job;
use crate::modules::jobs::updater::JobStatusUpdater;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::user::scope::UserScope;
use crate::{raise_error, utc_now};

static JOB_QUEUE: OnceLock<JobQueue> = OnceLock::new();

/// Facade over the durable queue: submission, cancellation and status
/// queries, all scoped to one user's store.
pub struct JobQueue {
    store: Arc<NativeDbJobStore>,
}

impl Initialize for JobQueue {
    async fn initialize() -> MailSweepResult<()> {
        NativeDbJobStore::restore().await?;
        let queue = JobQueue::new().await;
        let _ = JOB_QUEUE.set(queue);
        Ok(())
    }
}

impl JobQueue {
    pub fn get() -> MailSweepResult<&'static JobQueue> {
        JOB_QUEUE.get().ok_or_else(|| {
            raise_error!("JobQueue not initialized".into(), ErrorCode::InternalError)
        })
    }

    pub async fn new() -> Self {
        let store = Arc::new(NativeDbJobStore::init());

        let mut handlers = JobHandlers::new();
        handlers.register::<CategorizeJob>();
        handlers.register::<CleanupJob>();

        // Worker counts are user-tunable but never exceed what the host
        // can actually run in parallel.
        let worker_cap = (num_cpus::get() * 2).max(1);
        let queue_concurrency: DashMap<String, usize> = DashMap::new();
        queue_concurrency.insert(
            CATEGORIZE_QUEUE.to_owned(),
            (SETTINGS.mailsweep_categorize_workers as usize).min(worker_cap),
        );
        queue_concurrency.insert(
            CLEANUP_QUEUE.to_owned(),
            (SETTINGS.mailsweep_cleanup_workers as usize).min(worker_cap),
        );

        let status_updater = Arc::new(JobStatusUpdater::new(
            store.clone(),
            queue_concurrency.len(),
        ));
        let flow = Arc::new(JobFlow::new(
            store.clone(),
            &queue_concurrency,
            Arc::new(handlers),
            status_updater,
        ));
        flow.start().await;

        JobCleaner::new(store.clone()).start(Duration::from_secs(60 * 10));

        JobQueue { store }
    }

    /// Enqueues a job into the submitting user's durable queue and returns
    /// its id.
    pub async fn submit<T>(
        &self,
        scope: &UserScope,
        job: T,
        delay_seconds: Option<u32>,
    ) -> MailSweepResult<u64>
    where
        T: Job + Send + Sync + 'static,
    {
        if job.user_id() != scope.user_id {
            return Err(raise_error!(
                "A job may only be enqueued into its own user's queue".into(),
                ErrorCode::PermissionDenied
            ));
        }
        let mut meta = job.new_meta()?;
        let delay_ms = delay_seconds.unwrap_or(meta.delay_seconds) as i64 * 1000;
        meta.next_run = utc_now!() + delay_ms;
        let job_id = meta.id;
        NativeDbJobStore::store_one(&scope.db, meta).await?;
        Ok(job_id)
    }

    /// Cooperative cancel: pending jobs flip immediately, running jobs get
    /// their in-process flag tripped and finish at the next batch
    /// boundary.
    pub async fn cancel(&self, scope: &UserScope, job_id: u64) -> MailSweepResult<JobStatus> {
        let status = NativeDbJobStore::request_cancel(&scope.db, job_id).await?;
        if let Some(flag) = running_jobs().get(&job_id) {
            flag.cancel();
        }
        Ok(status)
    }

    pub async fn get_job(&self, scope: &UserScope, job_id: u64) -> MailSweepResult<JobMeta> {
        NativeDbJobStore::get(&scope.db, job_id)
            .await?
            .ok_or_else(|| {
                raise_error!(
                    format!("Job '{job_id}' not found"),
                    ErrorCode::ResourceNotFound
                )
            })
    }

    /// Newest first with optional filters; offset/limit paginate.
    pub async fn list_jobs(
        &self,
        scope: &UserScope,
        job_type: Option<String>,
        status: Option<JobStatus>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> MailSweepResult<Vec<JobMeta>> {
        let jobs = JobEntity::list_filtered(
            &scope.db,
            job_type,
            status,
            limit.unwrap_or(50),
            offset.unwrap_or(0),
        )
        .await?;
        Ok(jobs.into_iter().map(Into::into).collect())
    }

    pub fn store(&self) -> Arc<NativeDbJobStore> {
        self.store.clone()
    }
}
