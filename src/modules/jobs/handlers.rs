use crate::modules::database::manager::DB_MANAGER;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailSweepError;
use crate::modules::jobs::model::{JobFailureKind, JobMeta};
use crate::modules::jobs::result::JobRunResult;
use crate::modules::jobs::task::{Job, JobContext};
use crate::modules::jobs::running_jobs;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::user::scope::CancellationFlag;
use crate::{raise_error, utc_now};
use ahash::AHashMap;
use std::time::{Duration, Instant};
use std::{future::Future, pin::Pin, sync::Arc};
use tracing::{error, info, warn};

// Maps a job key to a closure that deserializes params and runs the job.
pub type Handler = Arc<
    dyn Fn(
            String,
            JobContext,
        )
            -> Pin<Box<dyn Future<Output = Result<serde_json::Value, MailSweepError>> + Send>>
        + Send
        + Sync,
>;

#[derive(Clone, Default)]
pub struct JobHandlers {
    handlers: AHashMap<String, Handler>,
}

impl JobHandlers {
    pub fn new() -> Self {
        Self {
            handlers: AHashMap::new(),
        }
    }

    pub fn register<T>(&mut self)
    where
        T: Job,
    {
        self.handlers.insert(
            T::JOB_KEY.to_owned(),
            Arc::new(|params, context| process::<T>(params, context)),
        );
    }

    /// Runs the job behind its key with the per-job timeout applied, and
    /// folds the outcome into retry bookkeeping. Cancellation observed by
    /// the job is terminal and never retried.
    pub async fn execute(&self, job_meta: JobMeta) -> JobRunResult {
        let job_id = job_meta.id;
        let job_key = job_meta.job_key.clone();
        let retry_policy = job_meta.retry_policy();
        let attempts = job_meta.retry_count.unwrap_or(0);

        let handler_option = self.handlers.get(&job_key).cloned();
        let mut result = match handler_option {
            Some(handler) => execute(handler, Arc::new(job_meta)).await,
            None => {
                error!("Unrecognized job '{job_key}'. This error should not occur; it may indicate that the job type has not been registered.");
                JobRunResult::failure(
                    job_id,
                    raise_error!(
                        "Unrecognized job type for the worker pool".into(),
                        ErrorCode::InternalError
                    ),
                    0,
                )
            }
        };

        if result.is_success() || result.cancelled {
            return result;
        }
        result.retry_count = attempts + 1;

        if let Some(max) = retry_policy.max_retries {
            if result.retry_count >= (max as usize) {
                warn!(
                    "Job {} has exceeded the maximum retry attempts of {}",
                    job_id, max
                );
                return result;
            }
        }
        let wait = retry_policy.wait_time((attempts + 1) as u32);
        result.next_run = Some(utc_now!() + (wait * 1000) as i64);
        result
    }
}

pub fn process<T>(
    params: String,
    context: JobContext,
) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, MailSweepError>> + Send>>
where
    T: Job,
{
    Box::pin(async move {
        let job = serde_json::from_str::<T>(params.as_str())
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        job.run(context).await
    })
}

async fn execute(handler: Handler, job_meta: Arc<JobMeta>) -> JobRunResult {
    let job_key = job_meta.job_key.clone();
    let queue_name = job_meta.queue_name.clone();
    let job_id = job_meta.id;
    let user_id = job_meta.user_id.clone();
    let params = job_meta.params.clone();
    let start = Instant::now();

    let database = match DB_MANAGER.user_db(&user_id).await {
        Ok(database) => database,
        Err(e) => return JobRunResult::failure(job_id, e, 0),
    };

    let cancel = CancellationFlag::new();
    if job_meta.cancel_requested {
        cancel.cancel();
    }
    running_jobs().insert(job_id, cancel.clone());

    let context = JobContext {
        job_id,
        user_id,
        db: database,
        cancel: cancel.clone(),
    };

    let job_timeout = Duration::from_secs(SETTINGS.mailsweep_job_timeout_seconds);
    let job_future = tokio::spawn(async move { (handler)(params, context).await });
    let abort_handle = job_future.abort_handle();
    let outcome = tokio::time::timeout(job_timeout, job_future).await;
    if outcome.is_err() {
        // The budget elapsed; stop the orphaned future so partial progress
        // stays where the last batch left it.
        abort_handle.abort();
    }
    running_jobs().remove(&job_id);
    let duration = start.elapsed();

    match outcome {
        Ok(Ok(Ok(results))) => {
            info!(
                "Job '{{{job_key}-{job_id}}}' in queue '{queue_name}' executed successfully, took {:?}",
                duration
            );
            JobRunResult::success(job_id, results, duration.as_millis() as usize)
        }
        Ok(Ok(Err(e))) if e.code() == ErrorCode::Cancelled => {
            info!("Job '{{{job_key}-{job_id}}}' in queue '{queue_name}' observed cancellation");
            JobRunResult::cancelled(job_id, duration.as_millis() as usize)
        }
        Ok(Ok(Err(e))) => {
            warn!("Job '{{{job_key}-{job_id}}}' in queue '{queue_name}' errored, {e:#?}");
            let mut result =
                JobRunResult::failure(job_id, e, duration.as_millis() as usize);
            result.failure_kind = Some(JobFailureKind::Internal);
            result
        }
        Ok(Err(e)) if e.is_panic() => {
            warn!("Job '{{{job_key}-{job_id}}}' in queue '{queue_name}' panicked");
            JobRunResult::failure(
                job_id,
                raise_error!("Job panicked".into(), ErrorCode::InternalError),
                duration.as_millis() as usize,
            )
        }
        Ok(Err(e)) => {
            warn!(
                "Job '{{{job_key}-{job_id}}}' in queue '{queue_name}' failed unexpectedly: {:?}",
                e
            );
            JobRunResult::failure(
                job_id,
                raise_error!(
                    format!("job failed unexpectedly: {:?}", e),
                    ErrorCode::InternalError
                ),
                duration.as_millis() as usize,
            )
        }
        Err(_) => {
            warn!(
                "Job '{{{job_key}-{job_id}}}' in queue '{queue_name}' timed out after {:?}",
                job_timeout
            );
            let mut result = JobRunResult::failure(
                job_id,
                raise_error!(
                    format!("Job exceeded its {job_timeout:?} execution budget"),
                    ErrorCode::OperationTimeout
                ),
                duration.as_millis() as usize,
            );
            result.failure_kind = Some(JobFailureKind::Timeout);
            result
        }
    }
}
