// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::{
    error::MailSweepResult,
    jobs::{model::JobMeta, result::JobRunResult},
};
use std::future::Future;

/// Persistence contract of the job queue. The durable rows are the truth;
/// everything in memory is a cache of them.
pub trait JobStore {
    fn store_job(&self, job: JobMeta) -> impl Future<Output = MailSweepResult<()>> + Send;

    /// Atomically claims due pending jobs across all known users, marking
    /// them in-progress with a start timestamp. Highest priority first,
    /// then oldest.
    fn fetch_pending_jobs(&self) -> impl Future<Output = MailSweepResult<Vec<JobMeta>>> + Send;

    fn update_execution_result(
        &self,
        job: &JobMeta,
        result: &JobRunResult,
    ) -> impl Future<Output = MailSweepResult<()>> + Send;

    fn update_progress(
        &self,
        user_id: &str,
        job_id: u64,
        progress: u8,
        details: Option<String>,
    ) -> impl Future<Output = MailSweepResult<()>> + Send;

    fn heartbeat(
        &self,
        user_id: &str,
        job_id: u64,
    ) -> impl Future<Output = MailSweepResult<()>> + Send;

    fn cleanup(&self) -> impl Future<Output = MailSweepResult<()>> + Send;
}
