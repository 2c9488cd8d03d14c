// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object, Union};
use serde::{Deserialize, Serialize};

use crate::{
    id,
    modules::{
        database::{async_find_impl, delete_impl, insert_impl, list_all_impl, update_impl},
        error::{code::ErrorCode, MailSweepResult},
        trigger::cron::CronExpression,
        user::scope::UserScope,
    },
    raise_error, utc_now,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum EventSignal {
    /// Total indexed mailbox bytes
    StorageUsage,
    /// Pending jobs in this user's queue
    QueueDepth,
    /// Failed share of recent jobs
    ErrorRate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct CronSchedule {
    /// Five-field cron expression, evaluated in the user's timezone
    pub expression: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct IntervalSchedule {
    pub minutes: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct EventSchedule {
    pub signal: EventSignal,
    /// Fires when the signal reaches this level, subject to the rate limit
    pub warning_threshold: f64,
    /// Reaching this level fires even inside the rate-limit window
    pub critical_threshold: f64,
    /// Rate limit between consecutive event fires
    pub min_interval_minutes: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Union)]
#[oai(discriminator_name = "kind")]
pub enum ScheduleSpec {
    Cron(CronSchedule),
    Interval(IntervalSchedule),
    Event(EventSchedule),
}

impl ScheduleSpec {
    pub fn validate(&self) -> MailSweepResult<()> {
        match self {
            ScheduleSpec::Cron(cron) => {
                CronExpression::parse(&cron.expression)?;
            }
            ScheduleSpec::Interval(interval) => {
                if interval.minutes == 0 {
                    return Err(raise_error!(
                        "Interval schedules need at least one minute".into(),
                        ErrorCode::InvalidParameter
                    ));
                }
            }
            ScheduleSpec::Event(event) => {
                if event.critical_threshold < event.warning_threshold {
                    return Err(raise_error!(
                        "critical_threshold must be at least warning_threshold".into(),
                        ErrorCode::InvalidParameter
                    ));
                }
                if event.min_interval_minutes == 0 {
                    return Err(raise_error!(
                        "Event schedules need a minimum interval".into(),
                        ErrorCode::InvalidParameter
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A registered trigger binding one policy to one schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 20, version = 1)]
#[native_db]
pub struct CleanupSchedule {
    #[primary_key]
    pub id: u64,
    pub policy_id: u64,
    pub enabled: bool,
    pub spec: ScheduleSpec,
    pub last_fired_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Default for CleanupSchedule {
    fn default() -> Self {
        Self {
            id: 0,
            policy_id: 0,
            enabled: true,
            spec: ScheduleSpec::Interval(IntervalSchedule { minutes: 60 }),
            last_fired_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }
}

impl CleanupSchedule {
    pub async fn create(
        scope: &UserScope,
        policy_id: u64,
        spec: ScheduleSpec,
        enabled: bool,
    ) -> MailSweepResult<CleanupSchedule> {
        spec.validate()?;
        let schedule = CleanupSchedule {
            id: id!(64),
            policy_id,
            enabled,
            spec,
            last_fired_at: None,
            created_at: utc_now!(),
            updated_at: utc_now!(),
        };
        insert_impl(&scope.db, schedule.clone()).await?;
        Ok(schedule)
    }

    pub async fn get(scope: &UserScope, schedule_id: u64) -> MailSweepResult<CleanupSchedule> {
        async_find_impl::<CleanupSchedule>(&scope.db, schedule_id)
            .await?
            .ok_or_else(|| {
                raise_error!(
                    format!("Schedule '{schedule_id}' not found"),
                    ErrorCode::ResourceNotFound
                )
            })
    }

    pub async fn list(scope: &UserScope) -> MailSweepResult<Vec<CleanupSchedule>> {
        let mut schedules = list_all_impl::<CleanupSchedule>(&scope.db).await?;
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(schedules)
    }

    pub async fn remove(scope: &UserScope, schedule_id: u64) -> MailSweepResult<()> {
        delete_impl(&scope.db, move |rw| {
            rw.get()
                .primary::<CleanupSchedule>(schedule_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .ok_or_else(|| {
                    raise_error!(
                        format!("Schedule '{schedule_id}' not found"),
                        ErrorCode::ResourceNotFound
                    )
                })
        })
        .await
    }

    pub async fn mark_fired(scope: &UserScope, schedule_id: u64, at: i64) -> MailSweepResult<()> {
        update_impl(
            &scope.db,
            move |rw| {
                rw.get()
                    .primary::<CleanupSchedule>(schedule_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Schedule '{schedule_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.last_fired_at = Some(at);
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }
}
