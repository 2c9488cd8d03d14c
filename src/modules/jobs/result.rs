use crate::modules::error::{MailSweepError, MailSweepResult};
use crate::modules::jobs::model::JobFailureKind;

#[derive(Debug)]
pub struct JobRunResult {
    pub job_id: u64,
    pub last_duration_ms: usize,
    pub retry_count: usize,
    pub next_run: Option<i64>,
    pub failure_kind: Option<JobFailureKind>,
    pub cancelled: bool,
    /// Success payload is the job's results JSON.
    pub result: MailSweepResult<serde_json::Value>,
}

impl JobRunResult {
    pub fn success(job_id: u64, results: serde_json::Value, last_duration_ms: usize) -> Self {
        Self {
            job_id,
            result: Ok(results),
            last_duration_ms,
            retry_count: Default::default(),
            next_run: None,
            failure_kind: None,
            cancelled: false,
        }
    }

    pub fn failure(job_id: u64, error: MailSweepError, last_duration_ms: usize) -> Self {
        Self {
            job_id,
            result: Err(error),
            last_duration_ms,
            retry_count: Default::default(),
            next_run: None,
            failure_kind: None,
            cancelled: false,
        }
    }

    pub fn cancelled(job_id: u64, last_duration_ms: usize) -> Self {
        Self {
            job_id,
            result: Ok(serde_json::Value::Null),
            last_duration_ms,
            retry_count: Default::default(),
            next_run: None,
            failure_kind: None,
            cancelled: true,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.result.is_ok()
    }
}
