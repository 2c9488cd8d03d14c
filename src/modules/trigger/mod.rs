// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    modules::{
        common::signal::SIGNAL_MANAGER,
        database::manager::DB_MANAGER,
        email::entity::EmailIndex,
        error::MailSweepResult,
        health::{HealthStatus, HEALTH_MONITOR},
        jobs::{nativedb::JobEntity, queue::JobQueue, JobStatus},
        policy::entity::CleanupPolicy,
        settings::cli::SETTINGS,
        trigger::{
            cron::CronExpression,
            entity::{CleanupSchedule, EventSignal, ScheduleSpec},
        },
        user::{entity::User, scope::UserScope},
    },
    utc_now,
};

pub mod cron;
pub mod entity;

/// Time-based and event-based cleanup triggers. One loop evaluates every
/// user's schedules in sequence, which keeps per-user fire ordering
/// single-threaded; each due schedule enqueues a cleanup job.
pub struct TriggerScheduler;

impl TriggerScheduler {
    pub fn start() {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(SETTINGS.mailsweep_trigger_interval_secs));
            let mut shutdown = SIGNAL_MANAGER.subscribe();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = Self::evaluate_all_users().await {
                            warn!("Trigger evaluation pass failed: {:?}", e);
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Trigger scheduler shutting down");
                        break;
                    }
                }
            }
        });
    }

    async fn evaluate_all_users() -> MailSweepResult<()> {
        for user in User::list(true).await? {
            if let Err(e) = Self::evaluate_user(&user).await {
                warn!("Trigger evaluation failed for '{}': {:?}", user.user_id, e);
            }
        }
        Ok(())
    }

    async fn evaluate_user(user: &User) -> MailSweepResult<()> {
        let db = DB_MANAGER.user_db(&user.user_id).await?;
        let scope = UserScope {
            user_id: user.user_id.clone(),
            db,
            cancel: Default::default(),
        };
        let schedules = CleanupSchedule::list(&scope).await?;
        if schedules.is_empty() {
            return Ok(());
        }

        let offset = FixedOffset::east_opt(user.timezone_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        let now_ms = utc_now!();
        let now_local: DateTime<FixedOffset> =
            offset.from_utc_datetime(&Utc.timestamp_millis_opt(now_ms).unwrap().naive_utc());

        for schedule in schedules {
            if !schedule.enabled {
                continue;
            }
            let due = match &schedule.spec {
                ScheduleSpec::Cron(cron_schedule) => {
                    Self::cron_due(&cron_schedule.expression, &schedule, now_local, offset)?
                }
                ScheduleSpec::Interval(interval) => {
                    let interval_ms = interval.minutes as i64 * 60_000;
                    schedule
                        .last_fired_at
                        .map(|last| now_ms - last >= interval_ms)
                        .unwrap_or(true)
                }
                ScheduleSpec::Event(event) => {
                    let value = Self::event_signal_value(&scope, event).await?;
                    let min_interval_ms = event.min_interval_minutes as i64 * 60_000;
                    let rate_ok = schedule
                        .last_fired_at
                        .map(|last| now_ms - last >= min_interval_ms)
                        .unwrap_or(true);
                    // Warning crossings respect the per-trigger rate limit;
                    // a critical crossing escalates past it.
                    value >= event.critical_threshold
                        || (rate_ok && value >= event.warning_threshold)
                }
            };
            if !due {
                continue;
            }

            // Destructive work is never scheduled while health is critical.
            if HEALTH_MONITOR.current().status == HealthStatus::Critical {
                warn!(
                    "Skipping trigger fire for policy {} on '{}': health critical",
                    schedule.policy_id, scope.user_id
                );
                continue;
            }

            match CleanupPolicy::get(&scope, schedule.policy_id).await {
                Ok(policy) if policy.enabled => {
                    Self::enqueue_cleanup(&scope, &policy).await?;
                    CleanupSchedule::mark_fired(&scope, schedule.id, now_ms).await?;
                }
                Ok(_) => {}
                Err(e) => warn!(
                    "Schedule {} references missing policy {}: {:?}",
                    schedule.id, schedule.policy_id, e
                ),
            }
        }
        Ok(())
    }

    /// A cron schedule is due when at least one fire time falls between the
    /// last fire and now; missed fires during downtime coalesce into one.
    fn cron_due(
        expression: &str,
        schedule: &CleanupSchedule,
        now_local: DateTime<FixedOffset>,
        offset: FixedOffset,
    ) -> MailSweepResult<bool> {
        let cron = CronExpression::parse(expression)?;
        let reference = match schedule.last_fired_at {
            Some(last) => {
                offset.from_utc_datetime(&Utc.timestamp_millis_opt(last).unwrap().naive_utc())
            }
            // Never fired: anchor at creation so a fresh schedule does not
            // immediately replay the whole past.
            None => offset.from_utc_datetime(
                &Utc.timestamp_millis_opt(schedule.created_at)
                    .unwrap()
                    .naive_utc(),
            ),
        };
        Ok(cron
            .next_fire(reference)
            .map(|fire| fire <= now_local)
            .unwrap_or(false))
    }

    /// Current value of the monitored signal an event schedule watches.
    async fn event_signal_value(
        scope: &UserScope,
        event: &entity::EventSchedule,
    ) -> MailSweepResult<f64> {
        let value = match event.signal {
            EventSignal::StorageUsage => EmailIndex::list_all(scope)
                .await?
                .iter()
                .map(|email| email.size.unwrap_or(0))
                .sum::<u64>() as f64,
            EventSignal::QueueDepth => {
                JobEntity::count_by_status(&scope.db, JobStatus::Pending).await? as f64
            }
            EventSignal::ErrorRate => HEALTH_MONITOR.current().signals.error_rate,
        };
        Ok(value)
    }

    async fn enqueue_cleanup(scope: &UserScope, policy: &CleanupPolicy) -> MailSweepResult<()> {
        use crate::modules::cleanup::task::CleanupJob;
        let job = CleanupJob {
            user_id: scope.user_id.clone(),
            policy_id: Some(policy.id),
            dry_run: false,
            max_emails: None,
            force: false,
            trigger: "schedule".into(),
        };
        JobQueue::get()?.submit(scope, job, None).await?;
        info!(
            "Scheduled cleanup job enqueued for user '{}' policy '{}'",
            scope.user_id, policy.name
        );
        Ok(())
    }
}
