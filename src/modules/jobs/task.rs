use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailSweepResult;
use crate::modules::jobs::model::JobMeta;
use crate::modules::jobs::nativedb::meta::NativeDbJobStore;
use crate::modules::jobs::retry::{RetryPolicy, RetryStrategy};
use crate::modules::user::scope::CancellationFlag;
use crate::raise_error;
use native_db::Database;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::warn;

pub type JobFuture = Pin<Box<dyn Future<Output = MailSweepResult<serde_json::Value>> + Send>>;

/// Execution-time handle given to a running job: identity, the owning
/// user's store, a progress reporter and the cooperative cancel token.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: u64,
    pub user_id: String,
    pub db: Arc<Database<'static>>,
    pub cancel: CancellationFlag,
}

impl JobContext {
    /// Best-effort progress write; a failed update never fails the job.
    pub async fn report_progress(&self, progress: u8, details: Option<serde_json::Value>) {
        let details = details.map(|value| value.to_string());
        if let Err(e) =
            NativeDbJobStore::set_progress(&self.db, self.job_id, progress.min(100), details).await
        {
            warn!(
                "Failed to report progress for job {}: {:?}",
                self.job_id, e
            );
        }
    }

    pub fn check_cancelled(&self) -> MailSweepResult<()> {
        self.cancel.check()
    }
}

/// A unit of background work. Implementations serialize their parameters
/// into the durable job row and are reconstructed by the worker that
/// claims the row.
pub trait Job: Serialize + DeserializeOwned + 'static {
    /// Unique identifier of this job type; doubles as `job_type` in the
    /// status store.
    const JOB_KEY: &'static str;

    /// The queue whose workers execute this job type.
    const JOB_QUEUE: &'static str;

    /// The mailbox this job belongs to.
    fn user_id(&self) -> &str;

    /// Queue priority in [0,100]; higher dequeues first.
    fn priority(&self) -> u8 {
        50
    }

    /// Default is exponential backoff with base 2 and max 3 retries.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            strategy: RetryStrategy::Exponential { base: 2 },
            max_retries: Some(3),
        }
    }

    /// Delay in seconds before the job becomes due.
    fn delay_seconds(&self) -> u32 {
        3
    }

    /// Executes the job. The returned JSON value is persisted as the job's
    /// results.
    fn run(self, context: JobContext) -> JobFuture;

    fn validate(&self) -> MailSweepResult<()> {
        if Self::JOB_QUEUE.is_empty() {
            return Err(raise_error!(
                "JOB_QUEUE must not be empty.".into(),
                ErrorCode::InternalError
            ));
        }
        if self.user_id().is_empty() {
            return Err(raise_error!(
                "A job must carry a user id.".into(),
                ErrorCode::InternalError
            ));
        }
        Ok(())
    }

    fn new_meta(&self) -> MailSweepResult<JobMeta> {
        self.validate()?;
        let params = serde_json::to_string(&self)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        let mut meta = JobMeta::new(
            Self::JOB_KEY.to_owned(),
            params,
            Self::JOB_QUEUE.to_owned(),
            self.user_id().to_owned(),
            self.priority(),
            self.retry_policy(),
            self.delay_seconds(),
        );
        meta.max_retries = self.retry_policy().max_retries;
        Ok(meta)
    }
}
