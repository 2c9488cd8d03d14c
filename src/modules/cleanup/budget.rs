// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::{
    modules::{
        cleanup::audit::{AuditAction, AuditRecord},
        error::MailSweepResult,
        policy::entity::SafetyConfig,
        user::scope::UserScope,
    },
    utc_now,
};

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Remaining deletion headroom for one policy, derived from the audit log
/// over rolling hour/day windows. `None` means no budget is configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeletionBudget {
    pub remaining: Option<u64>,
    pub used_last_hour: u64,
    pub used_last_day: u64,
}

impl DeletionBudget {
    pub fn unlimited() -> Self {
        Self {
            remaining: None,
            used_last_hour: 0,
            used_last_day: 0,
        }
    }
}

pub async fn deletion_budget(
    scope: &UserScope,
    safety: &SafetyConfig,
    policy_id: Option<u64>,
) -> MailSweepResult<DeletionBudget> {
    if safety.max_deletions_per_hour.is_none()
        && safety.max_deletions_per_day.is_none()
        && safety.max_deletions_per_run.is_none()
    {
        return Ok(DeletionBudget::unlimited());
    }

    let now = utc_now!();
    let records = AuditRecord::since(scope, now - DAY_MS, policy_id, Some(AuditAction::Delete)).await?;
    let used_last_day: u64 = records.iter().map(|r| r.email_ids.len() as u64).sum();
    let used_last_hour: u64 = records
        .iter()
        .filter(|r| r.created_at >= now - HOUR_MS)
        .map(|r| r.email_ids.len() as u64)
        .sum();

    let mut remaining = u64::MAX;
    if let Some(per_hour) = safety.max_deletions_per_hour {
        remaining = remaining.min((per_hour as u64).saturating_sub(used_last_hour));
    }
    if let Some(per_day) = safety.max_deletions_per_day {
        remaining = remaining.min((per_day as u64).saturating_sub(used_last_day));
    }
    if let Some(per_run) = safety.max_deletions_per_run {
        remaining = remaining.min(per_run as u64);
    }

    Ok(DeletionBudget {
        remaining: Some(remaining),
        used_last_hour,
        used_last_day,
    })
}
