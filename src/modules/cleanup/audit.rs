// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::{
    id,
    modules::{
        database::{async_find_impl, insert_impl, list_all_impl, scan_primary_filter_impl, upsert_impl},
        email::entity::EmailIndex,
        error::{code::ErrorCode, MailSweepResult},
        user::scope::UserScope,
    },
    raise_error, utc_now,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum AuditAction {
    #[default]
    Archive,
    Delete,
    Restore,
    EmptyTrash,
}

/// What restore needs to undo an archive: the fields the action changed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct EmailPreImage {
    pub email_id: String,
    pub labels: Vec<String>,
    pub archived: bool,
}

impl EmailPreImage {
    pub fn capture(email: &EmailIndex) -> Self {
        Self {
            email_id: email.email_id.clone(),
            labels: email.labels.clone(),
            archived: email.archived,
        }
    }
}

/// Append-only evidence of one destructive batch; the basis for restore
/// and for rolling deletion-budget accounting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 15, version = 1)]
#[native_db(primary_key(pk -> String))]
pub struct AuditRecord {
    #[secondary_key(unique)]
    pub id: u64,
    pub policy_id: Option<u64>,
    pub job_id: Option<u64>,
    pub action: AuditAction,
    pub email_ids: Vec<String>,
    pub pre_images: Vec<EmailPreImage>,
    /// What initiated the batch: "schedule", "manual", "event"
    pub trigger: String,
    pub dry_run: bool,
    pub created_at: i64,
}

impl AuditRecord {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    pub fn new(
        policy_id: Option<u64>,
        job_id: Option<u64>,
        action: AuditAction,
        emails: &[EmailIndex],
        trigger: &str,
        dry_run: bool,
    ) -> Self {
        Self {
            id: id!(64),
            policy_id,
            job_id,
            action,
            email_ids: emails.iter().map(|e| e.email_id.clone()).collect(),
            pre_images: emails.iter().map(EmailPreImage::capture).collect(),
            trigger: trigger.to_string(),
            dry_run,
            created_at: utc_now!(),
        }
    }

    pub async fn append(self, scope: &UserScope) -> MailSweepResult<AuditRecord> {
        insert_impl(&scope.db, self.clone()).await?;
        Ok(self)
    }

    /// Non-dry-run records newer than `since`, optionally restricted to one
    /// policy and one action.
    pub async fn since(
        scope: &UserScope,
        since: i64,
        policy_id: Option<u64>,
        action: Option<AuditAction>,
    ) -> MailSweepResult<Vec<AuditRecord>> {
        scan_primary_filter_impl::<AuditRecord>(&scope.db, move |record| {
            if record.dry_run || record.created_at < since {
                return false;
            }
            if let Some(policy_id) = policy_id {
                if record.policy_id != Some(policy_id) {
                    return false;
                }
            }
            if let Some(action) = action {
                if record.action != action {
                    return false;
                }
            }
            true
        })
        .await
    }
}

/// One restorable unit produced by an archive batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 16, version = 1)]
#[native_db]
pub struct ArchiveRecord {
    #[primary_key]
    pub id: u64,
    pub email_ids: Vec<String>,
    pub archive_date: i64,
    /// "gmail" or the export format name
    pub method: String,
    pub location: Option<String>,
    pub format: Option<String>,
    /// Total bytes covered by this record
    pub size: u64,
    pub restorable: bool,
    /// Set when the record has been restored
    pub restored_at: Option<i64>,
}

impl ArchiveRecord {
    pub async fn append(self, scope: &UserScope) -> MailSweepResult<ArchiveRecord> {
        insert_impl(&scope.db, self.clone()).await?;
        Ok(self)
    }

    pub async fn get(scope: &UserScope, archive_id: u64) -> MailSweepResult<ArchiveRecord> {
        async_find_impl::<ArchiveRecord>(&scope.db, archive_id)
            .await?
            .ok_or_else(|| {
                raise_error!(
                    format!("Archive record '{archive_id}' not found"),
                    ErrorCode::ResourceNotFound
                )
            })
    }

    pub async fn list(scope: &UserScope) -> MailSweepResult<Vec<ArchiveRecord>> {
        let mut records = list_all_impl::<ArchiveRecord>(&scope.db).await?;
        records.sort_by(|a, b| b.archive_date.cmp(&a.archive_date));
        Ok(records)
    }

    pub async fn mark_restored(scope: &UserScope, archive_id: u64) -> MailSweepResult<()> {
        let record = Self::get(scope, archive_id).await?;
        let mut updated = record.clone();
        updated.restored_at = Some(utc_now!());
        updated.restorable = false;
        crate::modules::database::update_impl(
            &scope.db,
            move |rw| {
                rw.get()
                    .primary::<ArchiveRecord>(archive_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Archive record '{archive_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |_| Ok(updated.clone()),
        )
        .await?;
        Ok(())
    }
}

/// Daily rollup of cleanup activity, upserted by the executor as batches
/// complete.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 21, version = 1)]
#[native_db]
pub struct DailyCleanupMetrics {
    /// Day key formatted `YYYYMMDD`
    #[primary_key]
    pub day: String,
    pub emails_archived: u64,
    pub emails_deleted: u64,
    pub storage_freed: u64,
    pub errors: u64,
    pub updated_at: i64,
}

impl DailyCleanupMetrics {
    pub fn day_key(timestamp_ms: i64) -> String {
        use chrono::{DateTime, Utc};
        DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
            .map(|dt| dt.format("%Y%m%d").to_string())
            .unwrap_or_else(|| "unknown".into())
    }

    /// Drops rollup rows older than the retention horizon.
    pub async fn clean_old(scope: &UserScope, keep_days: i64) -> MailSweepResult<()> {
        let cutoff_day = Self::day_key(utc_now!() - keep_days * 24 * 60 * 60 * 1000);
        crate::modules::database::batch_delete_impl(&scope.db, move |rw| {
            let stale: Vec<DailyCleanupMetrics> = rw
                .scan()
                .primary()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .all()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .filter_map(Result::ok)
                .filter(|daily: &DailyCleanupMetrics| daily.day < cutoff_day)
                .collect();
            Ok(stale)
        })
        .await?;
        Ok(())
    }

    pub async fn accumulate(
        scope: &UserScope,
        archived: u64,
        deleted: u64,
        storage_freed: u64,
        errors: u64,
    ) -> MailSweepResult<()> {
        let day = Self::day_key(utc_now!());
        let current = async_find_impl::<DailyCleanupMetrics>(&scope.db, day.clone())
            .await?
            .unwrap_or(DailyCleanupMetrics {
                day: day.clone(),
                ..Default::default()
            });
        let updated = DailyCleanupMetrics {
            day,
            emails_archived: current.emails_archived + archived,
            emails_deleted: current.emails_deleted + deleted,
            storage_freed: current.storage_freed + storage_freed,
            errors: current.errors + errors,
            updated_at: utc_now!(),
        };
        upsert_impl(&scope.db, updated).await
    }
}
