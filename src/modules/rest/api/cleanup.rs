// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem::web::Path;
use poem_openapi::{param::Query, payload::Json, Object, OpenApi};
use serde::{Deserialize, Serialize};

use crate::modules::access::get_access_summary;
use crate::modules::analyzer::config::AutomationConfigEntity;
use crate::modules::cleanup::metrics::{get_cleanup_metrics, CleanupMetricsReport};
use crate::modules::cleanup::recommendations::{
    get_cleanup_recommendations, CleanupRecommendation,
};
use crate::modules::cleanup::task::CleanupJob;
use crate::modules::common::auth::UserContext;
use crate::modules::email::entity::EmailIndex;
use crate::modules::error::code::ErrorCode;
use crate::modules::jobs::model::JobStatus;
use crate::modules::jobs::queue::JobQueue;
use crate::modules::policy::engine;
use crate::modules::policy::entity::{CleanupPolicy, CleanupPolicyRequest};
use crate::modules::rest::api::job::JobView;
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::ApiResult;
use crate::modules::staleness::{
    StalenessEvaluation, StalenessScorer, StalenessWeights, StalenessWeightsEntity,
};
use crate::modules::trigger::entity::{CleanupSchedule, ScheduleSpec};
use crate::modules::user::scope::UserScope;
use crate::raise_error;

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct TriggerCleanupRequest {
    pub policy_id: Option<String>,
    pub dry_run: bool,
    pub max_emails: Option<u32>,
    /// Include requires-confirmation candidates
    pub force: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct TriggerCleanupResponse {
    pub job_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct CleanupStatusResponse {
    pub automation_enabled: bool,
    pub pending_jobs: Vec<JobView>,
    pub running_jobs: Vec<JobView>,
    pub policies: Vec<CleanupPolicy>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Object)]
pub struct CreateScheduleRequest {
    pub policy_id: String,
    pub spec: ScheduleSpec,
    pub enabled: Option<bool>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct EmailEvaluationView {
    pub matched_policy: Option<String>,
    /// "clear" or "requires_confirmation" when a policy matched
    pub verdict: Option<String>,
    pub reasons: Vec<String>,
}

fn parse_id(raw: &str, what: &str) -> Result<u64, crate::modules::error::MailSweepError> {
    raw.parse().map_err(|_| {
        raise_error!(
            format!("Invalid {what} '{raw}'"),
            ErrorCode::InvalidParameter
        )
    })
}

pub struct CleanupApi;

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::Cleanup")]
impl CleanupApi {
    /// Enqueue a cleanup run for one policy, or all active policies
    #[oai(
        path = "/trigger-cleanup",
        method = "post",
        operation_id = "trigger_cleanup"
    )]
    async fn trigger_cleanup(
        &self,
        payload: Json<TriggerCleanupRequest>,
        context: UserContext,
    ) -> ApiResult<Json<TriggerCleanupResponse>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let request = payload.0;
        let policy_id = match request.policy_id {
            Some(raw) => {
                let policy_id = parse_id(&raw, "policy id")?;
                // Fail fast on unknown policies instead of dead-lettering
                // the job later.
                CleanupPolicy::get(&scope, policy_id).await?;
                Some(policy_id)
            }
            None => None,
        };
        let job = CleanupJob {
            user_id: scope.user_id.clone(),
            policy_id,
            dry_run: request.dry_run,
            max_emails: request.max_emails,
            force: request.force,
            trigger: "manual".into(),
        };
        let job_id = JobQueue::get()?.submit(&scope, job, None).await?;
        Ok(Json(TriggerCleanupResponse {
            job_id: job_id.to_string(),
        }))
    }

    /// Queue and policy overview of the cleanup automation
    #[oai(
        path = "/cleanup-status",
        method = "get",
        operation_id = "get_cleanup_status"
    )]
    async fn get_cleanup_status(
        &self,
        context: UserContext,
    ) -> ApiResult<Json<CleanupStatusResponse>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let queue = JobQueue::get()?;
        let pending = queue
            .list_jobs(&scope, None, Some(JobStatus::Pending), Some(20), None)
            .await?;
        let running = queue
            .list_jobs(&scope, None, Some(JobStatus::InProgress), Some(20), None)
            .await?;
        let config = AutomationConfigEntity::load(&scope).await?;
        Ok(Json(CleanupStatusResponse {
            automation_enabled: config.cleanup.enabled,
            pending_jobs: pending.into_iter().map(Into::into).collect(),
            running_jobs: running.into_iter().map(Into::into).collect(),
            policies: CleanupPolicy::list(&scope).await?,
        }))
    }

    /// Create a cleanup policy
    #[oai(
        path = "/cleanup-policy",
        method = "post",
        operation_id = "create_cleanup_policy"
    )]
    async fn create_cleanup_policy(
        &self,
        payload: Json<CleanupPolicyRequest>,
        context: UserContext,
    ) -> ApiResult<Json<CleanupPolicy>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        Ok(Json(CleanupPolicy::create(&scope, payload.0).await?))
    }

    /// Update a cleanup policy
    #[oai(
        path = "/cleanup-policy/:policy_id",
        method = "put",
        operation_id = "update_cleanup_policy"
    )]
    async fn update_cleanup_policy(
        &self,
        policy_id: Path<String>,
        payload: Json<CleanupPolicyRequest>,
        context: UserContext,
    ) -> ApiResult<Json<CleanupPolicy>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let policy_id = parse_id(&policy_id.0, "policy id")?;
        Ok(Json(
            CleanupPolicy::update(&scope, policy_id, payload.0).await?,
        ))
    }

    /// List policies, highest priority first
    #[oai(
        path = "/cleanup-policies",
        method = "get",
        operation_id = "list_cleanup_policies"
    )]
    async fn list_cleanup_policies(
        &self,
        context: UserContext,
    ) -> ApiResult<Json<Vec<CleanupPolicy>>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        Ok(Json(CleanupPolicy::list(&scope).await?))
    }

    /// Delete a cleanup policy
    #[oai(
        path = "/cleanup-policy/:policy_id",
        method = "delete",
        operation_id = "delete_cleanup_policy"
    )]
    async fn delete_cleanup_policy(
        &self,
        policy_id: Path<String>,
        context: UserContext,
    ) -> ApiResult<()> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let policy_id = parse_id(&policy_id.0, "policy id")?;
        CleanupPolicy::delete(&scope, policy_id).await?;
        Ok(())
    }

    /// Bind a policy to a cron, interval or event schedule
    #[oai(
        path = "/cleanup-schedule",
        method = "post",
        operation_id = "create_cleanup_schedule"
    )]
    async fn create_cleanup_schedule(
        &self,
        payload: Json<CreateScheduleRequest>,
        context: UserContext,
    ) -> ApiResult<Json<CleanupSchedule>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let request = payload.0;
        let policy_id = parse_id(&request.policy_id, "policy id")?;
        CleanupPolicy::get(&scope, policy_id).await?;
        Ok(Json(
            CleanupSchedule::create(
                &scope,
                policy_id,
                request.spec,
                request.enabled.unwrap_or(true),
            )
            .await?,
        ))
    }

    /// List registered schedules
    #[oai(
        path = "/cleanup-schedules",
        method = "get",
        operation_id = "list_cleanup_schedules"
    )]
    async fn list_cleanup_schedules(
        &self,
        context: UserContext,
    ) -> ApiResult<Json<Vec<CleanupSchedule>>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        Ok(Json(CleanupSchedule::list(&scope).await?))
    }

    /// Read the automation configuration
    #[oai(
        path = "/cleanup-automation-config",
        method = "get",
        operation_id = "get_cleanup_automation_config"
    )]
    async fn get_cleanup_automation_config(
        &self,
        context: UserContext,
    ) -> ApiResult<Json<AutomationConfigEntity>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        Ok(Json(AutomationConfigEntity::load(&scope).await?))
    }

    /// Replace the automation configuration
    #[oai(
        path = "/cleanup-automation-config",
        method = "post",
        operation_id = "update_cleanup_automation_config"
    )]
    async fn update_cleanup_automation_config(
        &self,
        payload: Json<AutomationConfigEntity>,
        context: UserContext,
    ) -> ApiResult<Json<AutomationConfigEntity>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        AutomationConfigEntity::store(&scope, payload.0).await?;
        Ok(Json(AutomationConfigEntity::load(&scope).await?))
    }

    /// Cleanup activity over a rolling window
    #[oai(
        path = "/cleanup-metrics",
        method = "get",
        operation_id = "get_cleanup_metrics"
    )]
    async fn get_cleanup_metrics(
        &self,
        hours: Query<Option<u32>>,
        context: UserContext,
    ) -> ApiResult<Json<CleanupMetricsReport>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        Ok(Json(
            get_cleanup_metrics(&scope, hours.0.unwrap_or(24)).await?,
        ))
    }

    /// Heuristic policy suggestions from the current index
    #[oai(
        path = "/cleanup-recommendations",
        method = "get",
        operation_id = "get_cleanup_recommendations"
    )]
    async fn get_cleanup_recommendations(
        &self,
        context: UserContext,
    ) -> ApiResult<Json<Vec<CleanupRecommendation>>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        Ok(Json(get_cleanup_recommendations(&scope).await?))
    }

    /// Dry evaluation of one email against the active policies
    #[oai(
        path = "/evaluate-email/:email_id",
        method = "get",
        operation_id = "evaluate_email"
    )]
    async fn evaluate_email(
        &self,
        email_id: Path<String>,
        context: UserContext,
    ) -> ApiResult<Json<EmailEvaluationView>> {
        use crate::modules::policy::safety::SafetyVerdict;
        let scope = UserScope::attach(&context.user.user_id).await?;
        let email = EmailIndex::get(&scope, &email_id.0).await?;
        let policies = CleanupPolicy::get_active(&scope).await?;
        let evaluation = engine::evaluate_email(&scope, &email, &policies).await?;
        Ok(Json(EmailEvaluationView {
            matched_policy: evaluation.matched_policy.map(|id| id.to_string()),
            verdict: evaluation.verdict.map(|verdict| match verdict {
                SafetyVerdict::Clear => "clear".to_string(),
                SafetyVerdict::RequiresConfirmation { .. } => {
                    "requires_confirmation".to_string()
                }
                SafetyVerdict::Protected { .. } => "protected".to_string(),
            }),
            reasons: evaluation.reasons,
        }))
    }

    /// Current staleness weights
    #[oai(
        path = "/staleness-weights",
        method = "get",
        operation_id = "get_staleness_weights"
    )]
    async fn get_staleness_weights(
        &self,
        context: UserContext,
    ) -> ApiResult<Json<StalenessWeights>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        Ok(Json(StalenessWeightsEntity::load(&scope).await?))
    }

    /// Update the staleness weights; rejected unless they sum to 1
    #[oai(
        path = "/staleness-weights",
        method = "post",
        operation_id = "update_staleness_weights"
    )]
    async fn update_staleness_weights(
        &self,
        payload: Json<StalenessWeights>,
        context: UserContext,
    ) -> ApiResult<Json<StalenessWeights>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        StalenessWeightsEntity::store(&scope, payload.0).await?;
        Ok(Json(StalenessWeightsEntity::load(&scope).await?))
    }

    /// Staleness evaluation of one email
    #[oai(
        path = "/staleness/:email_id",
        method = "get",
        operation_id = "evaluate_staleness"
    )]
    async fn evaluate_staleness(
        &self,
        email_id: Path<String>,
        context: UserContext,
    ) -> ApiResult<Json<StalenessEvaluation>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let email = EmailIndex::get(&scope, &email_id.0).await?;
        let summary = get_access_summary(&scope, &email_id.0).await?;
        let weights = StalenessWeightsEntity::load(&scope).await?;
        Ok(Json(
            StalenessScorer::new(weights).evaluate(&email, summary.as_ref()),
        ))
    }
}
