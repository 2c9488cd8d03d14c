use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        cleanup::audit::{AuditAction, AuditRecord, DailyCleanupMetrics},
        database::list_all_impl,
        error::MailSweepResult,
        user::scope::UserScope,
    },
    utc_now,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct CleanupMetricsReport {
    pub window_hours: u32,
    pub archived: u64,
    pub deleted: u64,
    pub restored: u64,
    pub batches: u64,
    /// From the daily rollups overlapping the window
    pub storage_freed: u64,
    pub errors: u64,
}

/// Aggregates cleanup activity over a rolling window: exact batch counts
/// from the audit log, byte totals from the daily rollups.
pub async fn get_cleanup_metrics(
    scope: &UserScope,
    hours: u32,
) -> MailSweepResult<CleanupMetricsReport> {
    let since = utc_now!() - (hours as i64) * 60 * 60 * 1000;
    let records = AuditRecord::since(scope, since, None, None).await?;

    let mut report = CleanupMetricsReport {
        window_hours: hours,
        ..Default::default()
    };
    for record in &records {
        let count = record.email_ids.len() as u64;
        match record.action {
            AuditAction::Archive => report.archived += count,
            AuditAction::Delete | AuditAction::EmptyTrash => report.deleted += count,
            AuditAction::Restore => report.restored += count,
        }
        report.batches += 1;
    }

    let window_days: Vec<String> = (0..=(hours as i64 / 24))
        .map(|offset| DailyCleanupMetrics::day_key(utc_now!() - offset * 24 * 60 * 60 * 1000))
        .collect();
    for daily in list_all_impl::<DailyCleanupMetrics>(&scope.db).await? {
        if window_days.contains(&daily.day) {
            report.storage_freed += daily.storage_freed;
            report.errors += daily.errors;
        }
    }

    Ok(report)
}
