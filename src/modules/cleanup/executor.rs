// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::{
    modules::{
        analyzer::config::AutomationConfigEntity,
        cleanup::audit::{ArchiveRecord, AuditAction, AuditRecord, DailyCleanupMetrics},
        email::entity::EmailIndex,
        error::{code::ErrorCode, MailSweepResult},
        export,
        gmail::{archive_messages, GmailApi},
        health::{HealthStatus, HEALTH_MONITOR},
        jobs::task::JobContext,
        metrics::MAILSWEEP_EMAILS_CLEANED_TOTAL,
        policy::{
            engine::{evaluate_batch, PolicyCandidate, SkippedEmail},
            entity::{CleanupActionType, CleanupMethod, CleanupPolicy},
        },
        user::scope::{cleanup_lock, UserScope},
    },
    id, raise_error, utc_now,
};
use crate::modules::settings::cli::SETTINGS;

// Bounds in-flight destructive provider I/O across every cleanup job in
// the process.
static DESTRUCTIVE_OPS: LazyLock<Arc<Semaphore>> = LazyLock::new(|| {
    Arc::new(Semaphore::new(
        SETTINGS.mailsweep_max_concurrent_operations as usize,
    ))
});

#[derive(Clone, Debug, Default)]
pub struct CleanupOptions {
    pub dry_run: bool,
    pub max_emails: Option<u32>,
    /// Includes requires-confirmation candidates in the run
    pub force: bool,
    pub trigger: String,
    /// Narrows the run to an explicit id set (manual tools)
    pub restrict_ids: Option<Vec<String>>,
}

/// Counters mirrored into the job's `progress_details` between batches.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct CleanupProgress {
    pub emails_analyzed: u64,
    pub emails_cleaned: u64,
    pub storage_freed: u64,
    pub errors_encountered: u64,
    pub current_batch: u64,
    pub total_batches: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct CleanupRunSummary {
    pub policy_id: u64,
    pub archived: u64,
    pub deleted: u64,
    pub storage_freed: u64,
    pub errors: u64,
    pub batches: u64,
    pub truncated: bool,
    pub dry_run: bool,
    pub skipped: Vec<SkippedEmail>,
    pub requires_confirmation: Vec<SkippedEmail>,
    pub archive_record_ids: Vec<u64>,
}

pub struct CleanupExecutor;

impl CleanupExecutor {
    /// Runs one policy to completion under the user's exclusive cleanup
    /// lock. `gmail` may be None for dry runs and export-method policies.
    pub async fn run_policy<G: GmailApi>(
        scope: &UserScope,
        job: Option<&JobContext>,
        policy: &CleanupPolicy,
        options: &CleanupOptions,
        gmail: Option<&G>,
    ) -> MailSweepResult<CleanupRunSummary> {
        if HEALTH_MONITOR.current().status == HealthStatus::Critical {
            return Err(raise_error!(
                "Cleanup is paused while system health is critical".into(),
                ErrorCode::Unavailable
            ));
        }

        let config = AutomationConfigEntity::load(scope).await?;
        let effective_max = options
            .max_emails
            .unwrap_or(config.cleanup.max_emails_per_run);

        let lock = cleanup_lock(&scope.user_id);
        let _guard = lock.write().await;

        let restrict: Option<std::collections::HashSet<String>> = options
            .restrict_ids
            .as_ref()
            .map(|ids| ids.iter().cloned().collect());
        let candidate_set =
            evaluate_batch(scope, policy, Some(effective_max), restrict.as_ref()).await?;

        let mut summary = CleanupRunSummary {
            policy_id: policy.id,
            truncated: candidate_set.truncated,
            dry_run: options.dry_run,
            skipped: candidate_set.skipped.clone(),
            ..Default::default()
        };

        let mut actionable: Vec<PolicyCandidate> = candidate_set.clear;
        if options.force {
            actionable.extend(candidate_set.requires_confirmation);
        } else {
            summary.requires_confirmation = candidate_set
                .requires_confirmation
                .iter()
                .map(|candidate| SkippedEmail {
                    email_id: candidate.email.email_id.clone(),
                    reason: candidate
                        .verdict
                        .reason()
                        .unwrap_or("requires_confirmation")
                        .to_string(),
                })
                .collect();
        }

        let mut progress = CleanupProgress {
            emails_analyzed: (actionable.len()
                + summary.skipped.len()
                + summary.requires_confirmation.len()) as u64,
            ..Default::default()
        };

        if options.dry_run {
            // Report what would happen without touching anything.
            match policy.action.action_type {
                CleanupActionType::Archive => summary.archived = actionable.len() as u64,
                CleanupActionType::Delete => summary.deleted = actionable.len() as u64,
            }
            summary.storage_freed = actionable
                .iter()
                .map(|candidate| candidate.email.size.unwrap_or(0))
                .sum();
            return Ok(summary);
        }

        let batch_size = config.cleanup.batch_size.max(1) as usize;
        let batches: Vec<&[PolicyCandidate]> = actionable.chunks(batch_size).collect();
        progress.total_batches = batches.len() as u64;

        for (index, batch) in batches.iter().enumerate() {
            scope.cancel.check()?;
            if let Some(job) = job {
                job.check_cancelled()?;
            }
            if HEALTH_MONITOR.current().status == HealthStatus::Critical {
                warn!(
                    "Halting cleanup for '{}' mid-run: health critical",
                    scope.user_id
                );
                summary.truncated = true;
                break;
            }

            progress.current_batch = (index + 1) as u64;
            let emails: Vec<EmailIndex> =
                batch.iter().map(|candidate| candidate.email.clone()).collect();
            let batch_bytes: u64 = emails.iter().map(|email| email.size.unwrap_or(0)).sum();

            let _permit = DESTRUCTIVE_OPS.clone().acquire_owned().await.map_err(|e| {
                raise_error!(format!("{:#?}", e), ErrorCode::InternalError)
            })?;
            let batch_result = Self::execute_batch(scope, job, policy, options, gmail, &emails).await;
            drop(_permit);
            match batch_result {
                Ok(archive_record_id) => {
                    if let Some(record_id) = archive_record_id {
                        summary.archive_record_ids.push(record_id);
                    }
                    match policy.action.action_type {
                        CleanupActionType::Archive => {
                            summary.archived += emails.len() as u64;
                            MAILSWEEP_EMAILS_CLEANED_TOTAL
                                .with_label_values(&["archive"])
                                .inc_by(emails.len() as u64);
                            DailyCleanupMetrics::accumulate(
                                scope,
                                emails.len() as u64,
                                0,
                                batch_bytes,
                                0,
                            )
                            .await?;
                        }
                        CleanupActionType::Delete => {
                            summary.deleted += emails.len() as u64;
                            MAILSWEEP_EMAILS_CLEANED_TOTAL
                                .with_label_values(&["delete"])
                                .inc_by(emails.len() as u64);
                            DailyCleanupMetrics::accumulate(
                                scope,
                                0,
                                emails.len() as u64,
                                batch_bytes,
                                0,
                            )
                            .await?;
                        }
                    }
                    summary.storage_freed += batch_bytes;
                    progress.emails_cleaned += emails.len() as u64;
                    progress.storage_freed += batch_bytes;
                }
                Err(e) => {
                    warn!(
                        "Cleanup batch {} failed for policy '{}': {:?}",
                        index + 1,
                        policy.name,
                        e
                    );
                    summary.errors += emails.len() as u64;
                    progress.errors_encountered += emails.len() as u64;
                    DailyCleanupMetrics::accumulate(scope, 0, 0, 0, emails.len() as u64).await?;
                }
            }
            summary.batches += 1;

            if let Some(job) = job {
                let percent = ((index + 1) * 100 / batches.len().max(1)).min(100) as u8;
                job.report_progress(
                    percent,
                    serde_json::to_value(&progress).ok(),
                )
                .await;
            }

            Self::inter_batch_delay(config.cleanup.inter_batch_delay_ms).await;
        }

        // Ad-hoc policies built by the manual tools are never persisted;
        // only update last_run_at for stored ones.
        if let Err(e) = CleanupPolicy::touch_last_run(scope, policy.id).await {
            if e.code() != ErrorCode::ResourceNotFound {
                return Err(e);
            }
        }
        info!(
            "Cleanup run finished for '{}' policy '{}': archived={} deleted={} errors={}",
            scope.user_id, policy.name, summary.archived, summary.deleted, summary.errors
        );
        Ok(summary)
    }

    /// Executes one batch: provider call, store update, audit append. The
    /// audit record is written in the same pass so the archived flag and
    /// the record always agree at batch granularity.
    async fn execute_batch<G: GmailApi>(
        scope: &UserScope,
        job: Option<&JobContext>,
        policy: &CleanupPolicy,
        options: &CleanupOptions,
        gmail: Option<&G>,
        emails: &[EmailIndex],
    ) -> MailSweepResult<Option<u64>> {
        let ids: Vec<String> = emails.iter().map(|email| email.email_id.clone()).collect();
        let batch_bytes: u64 = emails.iter().map(|email| email.size.unwrap_or(0)).sum();
        let job_id = job.map(|job| job.job_id);

        match (policy.action.action_type, policy.action.method) {
            (CleanupActionType::Archive, CleanupMethod::Gmail) => {
                let gmail = require_gmail(gmail)?;
                archive_messages(gmail, &ids).await?;
                EmailIndex::mark_archived(scope, &ids, Some("gmail:archive".into())).await?;
                let record = ArchiveRecord {
                    id: id!(64),
                    email_ids: ids.clone(),
                    archive_date: utc_now!(),
                    method: "gmail".into(),
                    location: None,
                    format: None,
                    size: batch_bytes,
                    restorable: true,
                    restored_at: None,
                }
                .append(scope)
                .await?;
                AuditRecord::new(
                    Some(policy.id),
                    job_id,
                    AuditAction::Archive,
                    emails,
                    &options.trigger,
                    false,
                )
                .append(scope)
                .await?;
                Ok(Some(record.id))
            }
            (CleanupActionType::Archive, CleanupMethod::Export) => {
                let format = policy
                    .action
                    .export_format
                    .as_deref()
                    .unwrap_or("json");
                let archive_id = id!(64);
                let (location, file_size) =
                    export::export_batch(&scope.user_id, archive_id, format, emails).await?;
                EmailIndex::mark_archived(scope, &ids, Some(location.clone())).await?;
                let record = ArchiveRecord {
                    id: archive_id,
                    email_ids: ids.clone(),
                    archive_date: utc_now!(),
                    method: "export".into(),
                    location: Some(location),
                    format: Some(format.to_string()),
                    size: file_size,
                    restorable: true,
                    restored_at: None,
                }
                .append(scope)
                .await?;
                AuditRecord::new(
                    Some(policy.id),
                    job_id,
                    AuditAction::Archive,
                    emails,
                    &options.trigger,
                    false,
                )
                .append(scope)
                .await?;
                Ok(Some(record.id))
            }
            (CleanupActionType::Delete, CleanupMethod::Gmail) => {
                let gmail = require_gmail(gmail)?;
                gmail.batch_trash(&ids).await?;
                EmailIndex::delete_by_ids(scope, &ids).await?;
                AuditRecord::new(
                    Some(policy.id),
                    job_id,
                    AuditAction::Delete,
                    emails,
                    &options.trigger,
                    false,
                )
                .append(scope)
                .await?;
                Ok(None)
            }
            (CleanupActionType::Delete, CleanupMethod::Export) => {
                let format = policy
                    .action
                    .export_format
                    .as_deref()
                    .unwrap_or("json");
                let archive_id = id!(64);
                export::export_batch(&scope.user_id, archive_id, format, emails).await?;
                EmailIndex::delete_by_ids(scope, &ids).await?;
                AuditRecord::new(
                    Some(policy.id),
                    job_id,
                    AuditAction::Delete,
                    emails,
                    &options.trigger,
                    false,
                )
                .append(scope)
                .await?;
                Ok(None)
            }
        }
    }

    /// Adaptive pause between batches: grows under pressure, floors at
    /// zero when the base delay is zero.
    async fn inter_batch_delay(base_ms: u64) {
        if base_ms == 0 {
            return;
        }
        let multiplier = match HEALTH_MONITOR.current().status {
            HealthStatus::Healthy => 1,
            HealthStatus::Degraded => 4,
            HealthStatus::Critical => return,
        };
        tokio::time::sleep(Duration::from_millis(base_ms * multiplier)).await;
    }
}

fn require_gmail<G: GmailApi>(gmail: Option<&G>) -> MailSweepResult<&G> {
    gmail.ok_or_else(|| {
        raise_error!(
            "A Gmail client is required for this cleanup method".into(),
            ErrorCode::MissingConfiguration
        )
    })
}
