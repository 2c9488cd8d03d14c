use crate::{
    id,
    modules::jobs::retry::{RetryPolicy, RetryStrategy},
    utc_now,
};
use poem_openapi::Enum;
use serde::{Deserialize, Serialize};
use std::fmt;

type LinearInterval = u32;
type ExponentialBase = u32;

/// Durable job row shared between the queue, the workers and the status
/// store. One instance describes one job for one user.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct JobMeta {
    pub id: u64,
    pub job_key: String,
    pub params: String,
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

/// Lifecycle states of a job, from enqueue to a terminal outcome.
#[derive(Clone, Copy, Debug, Eq, Default, PartialEq, Serialize, Deserialize, Hash, Enum)]
pub enum JobStatus {
    /// Enqueued and waiting for a worker.
    #[default]
    Pending,

    /// Claimed by exactly one worker.
    InProgress,

    /// Finished successfully; progress is 100.
    Completed,

    /// Terminal failure (including retry exhaustion and timeouts).
    Failed,

    /// Cooperatively cancelled; partial progress is preserved.
    Cancelled,
}

impl JobStatus {
    pub fn code(&self) -> u32 {
        match &self {
            JobStatus::Pending => 1,
            JobStatus::InProgress => 2,
            JobStatus::Completed => 3,
            JobStatus::Failed => 4,
            JobStatus::Cancelled => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status_str = match self {
            JobStatus::Pending => "Pending",
            JobStatus::InProgress => "InProgress",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", status_str)
    }
}

/// Why a job reached `Failed`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Hash, Enum)]
pub enum JobFailureKind {
    /// Retry budget used up; the job is dead-lettered.
    Exhausted,
    /// The per-job execution budget elapsed.
    Timeout,
    /// The upstream provider failed.
    Upstream,
    Internal,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Retry {
    #[default]
    Linear,
    Exponential,
}

impl fmt::Display for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retry::Linear => write!(f, "Linear"),
            Retry::Exponential => write!(f, "Exponential"),
        }
    }
}

fn to_retry(retry_policy: RetryPolicy) -> (Retry, LinearInterval, ExponentialBase) {
    match retry_policy.strategy {
        RetryStrategy::Linear { interval } => (Retry::Linear, interval, Default::default()),
        RetryStrategy::Exponential { base } => (Retry::Exponential, Default::default(), base),
    }
}

impl JobMeta {
    pub fn new(
        job_key: String,
        params: String,
        queue_name: String,
        user_id: String,
        priority: u8,
        retry_policy: RetryPolicy,
        delay_seconds: u32,
    ) -> Self {
        let (retry_strategy, retry_interval, base_interval) = to_retry(retry_policy);
        Self {
            id: id!(96),
            job_key,
            params,
            queue_name,
            user_id,
            status: JobStatus::Pending,
            priority: priority.min(100),
            progress: 0,
            progress_details: None,
            results: None,
            last_error: None,
            failure_kind: None,
            cancel_requested: false,
            last_duration_ms: Default::default(),
            retry_count: Default::default(),
            next_run: Default::default(),
            retry_strategy,
            retry_interval,
            base_interval,
            delay_seconds,
            max_retries: None,
            heartbeat_at: Default::default(),
            created_at: utc_now!(),
            updated_at: utc_now!(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let strategy = match self.retry_strategy {
            Retry::Linear => RetryStrategy::Linear {
                interval: self.retry_interval,
            },
            Retry::Exponential => RetryStrategy::Exponential {
                base: self.base_interval,
            },
        };

        RetryPolicy {
            strategy,
            max_retries: self.max_retries,
        }
    }
}
