// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem_openapi::{payload::Json, Object, OpenApi};
use serde::{Deserialize, Serialize};

use crate::modules::cleanup::executor::{CleanupExecutor, CleanupOptions};
use crate::modules::cleanup::restore::{
    empty_trash, restore_archive, restore_emails, EmptyTrashResult, RestoreResult,
};
use crate::modules::cleanup::task::summarize_for_api;
use crate::modules::common::auth::UserContext;
use crate::modules::email::search::{search_emails, SearchCriteria};
use crate::modules::error::code::ErrorCode;
use crate::modules::gmail::client::GmailClient;
use crate::modules::policy::entity::{
    CleanupAction, CleanupActionType, CleanupMethod, CleanupPolicy, PolicyCriteria, SafetyConfig,
};
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::ApiResult;
use crate::modules::user::scope::UserScope;
use crate::{id, raise_error, utc_now};

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct ArchiveEmailsRequest {
    pub criteria: SearchCriteria,
    /// "gmail" archives provider-side; "export" writes a local export file
    pub method: Option<CleanupMethod>,
    pub export_format: Option<String>,
    pub dry_run: bool,
    pub max_count: Option<u32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct DeleteEmailsRequest {
    pub criteria: SearchCriteria,
    pub dry_run: bool,
    pub max_count: Option<u32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct RestoreEmailsRequest {
    pub archive_id: Option<String>,
    pub email_ids: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct EmptyTrashRequest {
    pub dry_run: bool,
    pub max_count: Option<u32>,
}

/// One-shot policy for the manual tools: the search layer decides which
/// emails are in scope (passed through restrict_ids), the default safety
/// gates still apply in full.
fn adhoc_policy(
    name: &str,
    action_type: CleanupActionType,
    method: CleanupMethod,
    export_format: Option<String>,
) -> CleanupPolicy {
    CleanupPolicy {
        id: id!(64),
        name: format!("{name}-{}", utc_now!()),
        description: None,
        enabled: true,
        priority: 100,
        criteria: PolicyCriteria::default(),
        action: CleanupAction {
            action_type,
            method,
            export_format,
        },
        safety: SafetyConfig::default(),
        schedule: None,
        created_at: utc_now!(),
        updated_at: utc_now!(),
        last_run_at: None,
    }
}

pub struct LifecycleApi;

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::Lifecycle")]
impl LifecycleApi {
    /// Archive emails matching criteria, via Gmail labels or a local export
    #[oai(
        path = "/archive-emails",
        method = "post",
        operation_id = "archive_emails"
    )]
    async fn archive_emails(
        &self,
        payload: Json<ArchiveEmailsRequest>,
        context: UserContext,
    ) -> ApiResult<Json<serde_json::Value>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let request = payload.0;
        let method = request.method.unwrap_or(CleanupMethod::Gmail);
        if method == CleanupMethod::Export && request.export_format.is_none() {
            return Err(raise_error!(
                "export_format is required when method is export".into(),
                ErrorCode::InvalidParameter
            )
            .into());
        }
        let matched = search_emails(&scope, &request.criteria, None, None).await?;
        let policy = adhoc_policy(
            "manual-archive",
            CleanupActionType::Archive,
            method,
            request.export_format.clone(),
        );
        let options = CleanupOptions {
            dry_run: request.dry_run,
            max_emails: request.max_count,
            force: false,
            trigger: "manual".into(),
            restrict_ids: Some(matched.iter().map(|email| email.email_id.clone()).collect()),
        };
        let gmail = if request.dry_run || method == CleanupMethod::Export {
            None
        } else {
            Some(GmailClient::for_user(&scope.user_id).await?)
        };
        let summary =
            CleanupExecutor::run_policy(&scope, None, &policy, &options, gmail.as_ref()).await?;
        Ok(Json(summarize_for_api(&summary)?))
    }

    /// Delete emails matching criteria (provider-side trash + index removal)
    #[oai(
        path = "/delete-emails",
        method = "post",
        operation_id = "delete_emails"
    )]
    async fn delete_emails(
        &self,
        payload: Json<DeleteEmailsRequest>,
        context: UserContext,
    ) -> ApiResult<Json<serde_json::Value>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let request = payload.0;
        let matched = search_emails(&scope, &request.criteria, None, None).await?;
        let policy = adhoc_policy(
            "manual-delete",
            CleanupActionType::Delete,
            CleanupMethod::Gmail,
            None,
        );
        let options = CleanupOptions {
            dry_run: request.dry_run,
            max_emails: request.max_count,
            force: false,
            trigger: "manual".into(),
            restrict_ids: Some(matched.iter().map(|email| email.email_id.clone()).collect()),
        };
        let gmail = if request.dry_run {
            None
        } else {
            Some(GmailClient::for_user(&scope.user_id).await?)
        };
        let summary =
            CleanupExecutor::run_policy(&scope, None, &policy, &options, gmail.as_ref()).await?;
        Ok(Json(summarize_for_api(&summary)?))
    }

    /// Restore an archived batch by record id, or an explicit id list
    #[oai(
        path = "/restore-emails",
        method = "post",
        operation_id = "restore_emails"
    )]
    async fn restore_emails(
        &self,
        payload: Json<RestoreEmailsRequest>,
        context: UserContext,
    ) -> ApiResult<Json<RestoreResult>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let request = payload.0;
        let gmail = GmailClient::for_user(&scope.user_id).await.ok();

        if let Some(archive_id) = request.archive_id {
            let archive_id: u64 = archive_id.parse().map_err(|_| {
                raise_error!(
                    format!("Invalid archive_id '{archive_id}'"),
                    ErrorCode::InvalidParameter
                )
            })?;
            return Ok(Json(
                restore_archive(&scope, gmail.as_ref(), archive_id).await?,
            ));
        }
        let email_ids = request.email_ids.unwrap_or_default();
        Ok(Json(
            restore_emails(&scope, gmail.as_ref(), &email_ids).await?,
        ))
    }

    /// Permanently delete messages in the provider trash
    #[oai(path = "/empty-trash", method = "post", operation_id = "empty_trash")]
    async fn empty_trash(
        &self,
        payload: Json<EmptyTrashRequest>,
        context: UserContext,
    ) -> ApiResult<Json<EmptyTrashResult>> {
        let scope = UserScope::attach(&context.user.user_id).await?;
        let gmail = GmailClient::for_user(&scope.user_id).await?;
        Ok(Json(
            empty_trash(&scope, &gmail, payload.0.dry_run, payload.0.max_count).await?,
        ))
    }
}
