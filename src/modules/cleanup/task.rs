// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::modules::cleanup::executor::{CleanupExecutor, CleanupOptions, CleanupRunSummary};
use crate::modules::error::MailSweepResult;
use crate::modules::gmail::client::GmailClient;
use crate::modules::jobs::retry::{RetryPolicy, RetryStrategy};
use crate::modules::jobs::task::{Job, JobContext, JobFuture};
use crate::modules::policy::entity::{CleanupMethod, CleanupPolicy};
use crate::modules::user::scope::UserScope;

pub const CLEANUP_QUEUE: &str = "cleanup_queue";

/// Queue payload for one cleanup run. Without a policy id the run walks
/// every active policy in priority order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupJob {
    pub user_id: String,
    pub policy_id: Option<u64>,
    pub dry_run: bool,
    pub max_emails: Option<u32>,
    pub force: bool,
    pub trigger: String,
}

impl Job for CleanupJob {
    const JOB_KEY: &'static str = "cleanup_emails";
    const JOB_QUEUE: &'static str = CLEANUP_QUEUE;

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn priority(&self) -> u8 {
        60
    }

    // Destructive work retries once at most; the budget accounting in the
    // audit log keeps a retry from double-spending.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            strategy: RetryStrategy::Linear { interval: 60 },
            max_retries: Some(1),
        }
    }

    fn run(self, context: JobContext) -> JobFuture {
        Box::pin(async move {
            let scope = UserScope {
                user_id: context.user_id.clone(),
                db: context.db.clone(),
                cancel: context.cancel.clone(),
            };

            let policies = match self.policy_id {
                Some(policy_id) => vec![CleanupPolicy::get(&scope, policy_id).await?],
                None => CleanupPolicy::get_active(&scope).await?,
            };

            let options = CleanupOptions {
                dry_run: self.dry_run,
                max_emails: self.max_emails,
                force: self.force,
                trigger: self.trigger.clone(),
                restrict_ids: None,
            };

            let mut summaries: Vec<CleanupRunSummary> = Vec::new();
            for policy in &policies {
                // Export-only dry runs work without Gmail authorization.
                let gmail = if self.dry_run
                    || policy.action.method == CleanupMethod::Export
                {
                    None
                } else {
                    Some(GmailClient::for_user(&scope.user_id).await?)
                };
                let summary = CleanupExecutor::run_policy(
                    &scope,
                    Some(&context),
                    policy,
                    &options,
                    gmail.as_ref(),
                )
                .await?;
                summaries.push(summary);
            }

            let archived: u64 = summaries.iter().map(|s| s.archived).sum();
            let deleted: u64 = summaries.iter().map(|s| s.deleted).sum();
            let storage_freed: u64 = summaries.iter().map(|s| s.storage_freed).sum();
            let truncated = summaries.iter().any(|s| s.truncated);
            let skipped: Vec<_> = summaries.iter().flat_map(|s| s.skipped.clone()).collect();
            let requires_confirmation: Vec<_> = summaries
                .iter()
                .flat_map(|s| s.requires_confirmation.clone())
                .collect();

            Ok(json!({
                "policies_run": summaries.len(),
                "archived": archived,
                "deleted": deleted,
                "storage_freed": storage_freed,
                "truncated": truncated,
                "dry_run": self.dry_run,
                "skipped": skipped,
                "requires_confirmation": requires_confirmation,
                "summaries": summaries,
            }))
        })
    }
}

/// Shared result shape for the synchronous archive/delete tools that run a
/// one-off anonymous policy.
pub fn summarize_for_api(summary: &CleanupRunSummary) -> MailSweepResult<serde_json::Value> {
    Ok(json!({
        "archived": summary.archived,
        "deleted": summary.deleted,
        "storage_freed": summary.storage_freed,
        "errors": summary.errors,
        "truncated": summary.truncated,
        "dry_run": summary.dry_run,
        "skipped": summary.skipped,
        "requires_confirmation": summary.requires_confirmation,
        "archive_record_ids": summary.archive_record_ids,
    }))
}
