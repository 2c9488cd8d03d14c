// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem::web::Path;
use poem_openapi::{param::Query, payload::Json, Object, OpenApi};
use serde::{Deserialize, Serialize};

use crate::modules::common::auth::UserContext;
use crate::modules::error::code::ErrorCode;
use crate::modules::jobs::model::{JobFailureKind, JobMeta, JobStatus};
use crate::modules::jobs::queue::JobQueue;
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::ApiResult;
use crate::modules::user::scope::UserScope;
use crate::raise_error;

#[derive(Clone, Debug, Serialize, Deserialize, Object)]
pub struct JobView {
    pub job_id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub priority: u8,
    pub progress: u8,
    pub progress_details: Option<String>,
    pub results: Option<String>,
    pub error: Option<String>,
    pub failure_kind: Option<JobFailureKind>,
    pub cancel_requested: bool,
    pub retry_count: Option<u64>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl From<JobMeta> for JobView {
    fn from(meta: JobMeta) -> Self {
        Self {
            job_id: meta.id.to_string(),
            job_type: meta.job_key,
            status: meta.status,
            priority: meta.priority,
            progress: meta.progress,
            progress_details: meta.progress_details,
            results: meta.results,
            error: meta.last_error,
            failure_kind: meta.failure_kind,
            cancel_requested: meta.cancel_requested,
            retry_count: meta.retry_count.map(|count| count as u64),
            created_at: meta.created_at,
            started_at: meta.started_at,
            completed_at: meta.completed_at,
        }
    }
}

fn parse_job_id(raw: &str) -> Result<u64, crate::modules::error::MailSweepError> {
    raw.parse().map_err(|_| {
        raise_error!(
            format!("Invalid job id '{raw}'"),
            ErrorCode::InvalidParameter
        )
    })
}

pub struct JobApi;

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::Job")]
impl JobApi {
    /// Status and results of one job
    #[oai(path = "/job/:job_id", method = "get", operation_id = "get_job_status")]
    async fn get_job_status(
        &self,
        job_id: Path<String>,
        context: UserContext,
    ) -> ApiResult<Json<JobView>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let job_id = parse_job_id(&job_id.0)?;
        Ok(Json(JobQueue::get()?.get_job(&scope, job_id).await?.into()))
    }

    /// List the caller's jobs, newest first
    #[oai(path = "/list-jobs", method = "get", operation_id = "list_jobs")]
    async fn list_jobs(
        &self,
        job_type: Query<Option<String>>,
        status: Query<Option<JobStatus>>,
        limit: Query<Option<u64>>,
        offset: Query<Option<u64>>,
        context: UserContext,
    ) -> ApiResult<Json<Vec<JobView>>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let jobs = JobQueue::get()?
            .list_jobs(
                &scope,
                job_type.0,
                status.0,
                limit.0.map(|v| v as usize),
                offset.0.map(|v| v as usize),
            )
            .await?;
        Ok(Json(jobs.into_iter().map(Into::into).collect()))
    }

    /// Request cooperative cancellation of a pending or running job
    #[oai(
        path = "/cancel-job/:job_id",
        method = "post",
        operation_id = "cancel_job"
    )]
    async fn cancel_job(
        &self,
        job_id: Path<String>,
        context: UserContext,
    ) -> ApiResult<Json<JobView>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let job_id = parse_job_id(&job_id.0)?;
        JobQueue::get()?.cancel(&scope, job_id).await?;
        Ok(Json(JobQueue::get()?.get_job(&scope, job_id).await?.into()))
    }
}
