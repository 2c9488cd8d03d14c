// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::{LazyLock, RwLock};
use std::time::Duration;

use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    free_memory,
    modules::{
        common::{signal::SIGNAL_MANAGER, Initialize},
        database::manager::DB_MANAGER,
        error::MailSweepResult,
        jobs::{nativedb::JobEntity, JobStatus},
        metrics::MAILSWEEP_HEALTH_STATUS,
        settings::cli::SETTINGS,
    },
    utc_now,
};

pub static HEALTH_MONITOR: LazyLock<HealthMonitor> = LazyLock::new(HealthMonitor::new);

const ERROR_WINDOW_MS: i64 = 60 * 60 * 1000;

const QUEUE_DEPTH_DEGRADED: u64 = 1_000;
const QUEUE_DEPTH_CRITICAL: u64 = 5_000;
const ERROR_RATE_DEGRADED: f64 = 0.2;
const ERROR_RATE_CRITICAL: f64 = 0.5;
const MEMORY_PRESSURE_DEGRADED: f64 = 0.85;
const MEMORY_PRESSURE_CRITICAL: f64 = 0.95;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Critical,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct HealthSignals {
    /// Pending jobs summed over every open user queue
    pub queue_depth: u64,
    /// Failed share of jobs that reached a terminal state in the last hour
    pub error_rate: f64,
    /// 0 (all memory free) .. 1 (none free)
    pub memory_pressure: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub signals: HealthSignals,
    pub recommendations: Vec<String>,
    pub sampled_at: i64,
}

#[derive(Clone, Debug)]
pub enum HealthEvent {
    CriticalHealth,
    Recovered,
    Error(String),
}

/// Samples queue depth, recent job error rate and memory pressure on a
/// fixed interval. Destructive components read `current()` before
/// scheduling or executing; `Critical` vetoes new destructive work while
/// in-flight work drains.
pub struct HealthMonitor {
    current: RwLock<HealthReport>,
    events: broadcast::Sender<HealthEvent>,
}

impl HealthMonitor {
    fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            current: RwLock::new(HealthReport::default()),
            events,
        }
    }

    pub fn current(&self) -> HealthReport {
        self.current
            .read()
            .map(|report| report.clone())
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.events.subscribe()
    }

    fn publish(&self, report: HealthReport) {
        let previous = self.current();
        MAILSWEEP_HEALTH_STATUS.set(match report.status {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Critical => 2,
        });
        if previous.status != HealthStatus::Critical && report.status == HealthStatus::Critical {
            warn!("Health degraded to critical: {:?}", report.signals);
            let _ = self.events.send(HealthEvent::CriticalHealth);
        }
        if previous.status == HealthStatus::Critical && report.status != HealthStatus::Critical {
            info!("Health recovered from critical");
            let _ = self.events.send(HealthEvent::Recovered);
        }
        if let Ok(mut current) = self.current.write() {
            *current = report;
        }
    }

    async fn sample() -> MailSweepResult<HealthReport> {
        let mut queue_depth = 0u64;
        let mut terminal_recent = 0u64;
        let mut failed_recent = 0u64;
        let cutoff = utc_now!() - ERROR_WINDOW_MS;

        for user_id in DB_MANAGER.open_users() {
            let database = DB_MANAGER.user_db(&user_id).await?;
            queue_depth +=
                JobEntity::count_by_status(&database, JobStatus::Pending).await? as u64;
            let recent = crate::modules::database::scan_primary_filter_impl::<JobEntity>(
                &database,
                move |job| job.status.is_terminal() && job.updated_at >= cutoff,
            )
            .await?;
            terminal_recent += recent.len() as u64;
            failed_recent += recent
                .iter()
                .filter(|job| job.status == JobStatus::Failed)
                .count() as u64;
        }

        let error_rate = if terminal_recent > 0 {
            failed_recent as f64 / terminal_recent as f64
        } else {
            0.0
        };

        let free = free_memory!();
        let total = {
            let mut sys = sysinfo::System::new_all();
            sys.refresh_memory();
            sys.total_memory()
        };
        let memory_pressure = if total > 0 {
            1.0 - (free as f64 / total as f64)
        } else {
            0.0
        };

        let signals = HealthSignals {
            queue_depth,
            error_rate,
            memory_pressure,
        };
        let mut recommendations = Vec::new();
        let mut status = HealthStatus::Healthy;

        if queue_depth > QUEUE_DEPTH_DEGRADED {
            status = HealthStatus::Degraded;
            recommendations.push("Queue depth is high; consider more workers".to_string());
        }
        if error_rate > ERROR_RATE_DEGRADED {
            status = HealthStatus::Degraded;
            recommendations.push("Job error rate is elevated; inspect recent failures".to_string());
        }
        if memory_pressure > MEMORY_PRESSURE_DEGRADED {
            status = HealthStatus::Degraded;
            recommendations.push("Memory pressure is high".to_string());
        }
        if queue_depth > QUEUE_DEPTH_CRITICAL
            || error_rate > ERROR_RATE_CRITICAL
            || memory_pressure > MEMORY_PRESSURE_CRITICAL
        {
            status = HealthStatus::Critical;
            recommendations.push("Destructive automation is paused until health recovers".into());
        }

        Ok(HealthReport {
            status,
            signals,
            recommendations,
            sampled_at: utc_now!(),
        })
    }

    fn start_sampler() {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(
                SETTINGS.mailsweep_health_sample_interval_secs,
            ));
            let mut shutdown = SIGNAL_MANAGER.subscribe();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match Self::sample().await {
                            Ok(report) => HEALTH_MONITOR.publish(report),
                            Err(e) => {
                                error!("Health sampling failed: {:?}", e);
                                let _ = HEALTH_MONITOR.events.send(HealthEvent::Error(e.to_string()));
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Health monitor shutting down");
                        break;
                    }
                }
            }
        });
    }
}

impl Initialize for HealthMonitor {
    async fn initialize() -> MailSweepResult<()> {
        let _ = HEALTH_MONITOR.current();
        HealthMonitor::start_sampler();
        Ok(())
    }
}
