// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem::web::Path;
use poem_openapi::{param::Query, payload::Json, Object, OpenApi};
use serde::{Deserialize, Serialize};

use crate::modules::access::entity::{AccessSummaryEntity, AccessType};
use crate::modules::access::{get_access_summary, log_access, AccessEvent};
use crate::modules::cache::ANALYSIS_CACHE;
use crate::modules::categorize::task::CategorizeJob;
use crate::modules::categorize::CategorizeRequest;
use crate::modules::common::auth::UserContext;
use crate::modules::email::entity::{EmailIndex, SavedSearch};
use crate::modules::email::search::{count_emails, search_emails, SearchCriteria};
use crate::modules::email::stats::{get_email_stats, EmailStats, StatsGroupBy};
use crate::modules::error::code::ErrorCode;
use crate::modules::jobs::queue::JobQueue;
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::ApiResult;
use crate::modules::user::scope::UserScope;
use crate::raise_error;

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct ListEmailsRequest {
    pub filters: Option<SearchCriteria>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct SearchEmailsRequest {
    pub criteria: SearchCriteria,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct EmailListResponse {
    pub emails: Vec<EmailIndex>,
    pub total: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct ImportEmailsRequest {
    pub emails: Vec<EmailIndex>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct ImportEmailsResponse {
    pub imported: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct JobSubmitted {
    pub job_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct SaveSearchRequest {
    pub name: String,
    pub criteria: SearchCriteria,
}

#[derive(Clone, Debug, Serialize, Deserialize, Object)]
pub struct LogAccessRequest {
    pub email_id: String,
    pub access_type: AccessType,
    pub search_query: Option<String>,
    pub user_context: Option<String>,
}

pub struct EmailApi;

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::Email")]
impl EmailApi {
    /// List indexed emails with optional filters, newest first
    #[oai(path = "/list-emails", method = "post", operation_id = "list_emails")]
    async fn list_emails(
        &self,
        payload: Json<ListEmailsRequest>,
        context: UserContext,
    ) -> ApiResult<Json<EmailListResponse>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let criteria = payload.0.filters.unwrap_or_default();
        let total = count_emails(&scope, &criteria).await? as u64;
        let emails = search_emails(
            &scope,
            &criteria,
            payload.0.limit.map(|v| v as usize),
            payload.0.offset.map(|v| v as usize),
        )
        .await?;
        Ok(Json(EmailListResponse { emails, total }))
    }

    /// Search the index with full criteria
    #[oai(
        path = "/search-emails",
        method = "post",
        operation_id = "search_emails"
    )]
    async fn search_emails(
        &self,
        payload: Json<SearchEmailsRequest>,
        context: UserContext,
    ) -> ApiResult<Json<EmailListResponse>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let total = count_emails(&scope, &payload.0.criteria).await? as u64;
        let emails = search_emails(
            &scope,
            &payload.0.criteria,
            payload.0.limit.map(|v| v as usize),
            payload.0.offset.map(|v| v as usize),
        )
        .await?;
        Ok(Json(EmailListResponse { emails, total }))
    }

    /// Fetch one indexed email with its analyzer fields
    #[oai(
        path = "/email/:email_id",
        method = "get",
        operation_id = "get_email_details"
    )]
    async fn get_email_details(
        &self,
        email_id: Path<String>,
        context: UserContext,
    ) -> ApiResult<Json<EmailIndex>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        Ok(Json(EmailIndex::get(&scope, &email_id.0).await?))
    }

    /// Bulk-ingest Gmail metadata rows; idempotent by email id
    #[oai(
        path = "/import-emails",
        method = "post",
        operation_id = "import_emails"
    )]
    async fn import_emails(
        &self,
        payload: Json<ImportEmailsRequest>,
        context: UserContext,
    ) -> ApiResult<Json<ImportEmailsResponse>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let imported = payload.0.emails.len() as u64;
        EmailIndex::bulk_upsert(&scope, payload.0.emails).await?;
        // Re-ingested envelopes invalidate any cached analysis for them.
        ANALYSIS_CACHE.delete_prefix(&scope.user_id, "analysis");
        Ok(Json(ImportEmailsResponse { imported }))
    }

    /// Aggregate statistics over the index
    #[oai(
        path = "/email-stats",
        method = "get",
        operation_id = "get_email_stats"
    )]
    async fn get_email_stats(
        &self,
        group_by: Query<Option<StatsGroupBy>>,
        include_archived: Query<Option<bool>>,
        context: UserContext,
    ) -> ApiResult<Json<EmailStats>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        Ok(Json(
            get_email_stats(
                &scope,
                group_by.0.unwrap_or_default(),
                include_archived.0.unwrap_or(false),
            )
            .await?,
        ))
    }

    /// Enqueue a categorization job over the mailbox
    #[oai(
        path = "/categorize-emails",
        method = "post",
        operation_id = "categorize_emails"
    )]
    async fn categorize_emails(
        &self,
        payload: Json<CategorizeRequest>,
        context: UserContext,
    ) -> ApiResult<Json<JobSubmitted>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let job = CategorizeJob {
            user_id: scope.user_id.clone(),
            request: payload.0,
        };
        let job_id = JobQueue::get()?.submit(&scope, job, None).await?;
        Ok(Json(JobSubmitted {
            job_id: job_id.to_string(),
        }))
    }

    /// Persist a named search
    #[oai(path = "/save-search", method = "post", operation_id = "save_search")]
    async fn save_search(
        &self,
        payload: Json<SaveSearchRequest>,
        context: UserContext,
    ) -> ApiResult<Json<SavedSearch>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let criteria = serde_json::to_string(&payload.0.criteria)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InvalidParameter))?;
        SavedSearch::save(&scope, &payload.0.name, criteria).await?;
        let saved = SavedSearch::list(&scope)
            .await?
            .into_iter()
            .find(|search| search.name == payload.0.name)
            .ok_or_else(|| {
                raise_error!("Saved search disappeared".into(), ErrorCode::InternalError)
            })?;
        Ok(Json(saved))
    }

    /// List saved searches, newest first
    #[oai(
        path = "/saved-searches",
        method = "get",
        operation_id = "list_saved_searches"
    )]
    async fn list_saved_searches(
        &self,
        context: UserContext,
    ) -> ApiResult<Json<Vec<SavedSearch>>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        Ok(Json(SavedSearch::list(&scope).await?))
    }

    /// Record an email access event
    #[oai(path = "/log-access", method = "post", operation_id = "log_access")]
    async fn log_access(
        &self,
        payload: Json<LogAccessRequest>,
        context: UserContext,
    ) -> ApiResult<()> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        log_access(
            &scope,
            AccessEvent {
                email_id: payload.0.email_id,
                access_type: payload.0.access_type,
                timestamp: None,
                search_query: payload.0.search_query,
                user_context: payload.0.user_context,
            },
        )
        .await?;
        Ok(())
    }

    /// Derived access summary for one email
    #[oai(
        path = "/access-summary/:email_id",
        method = "get",
        operation_id = "get_access_summary"
    )]
    async fn get_access_summary(
        &self,
        email_id: Path<String>,
        context: UserContext,
    ) -> ApiResult<Json<Option<AccessSummaryEntity>>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        Ok(Json(get_access_summary(&scope, &email_id.0).await?))
    }
}
