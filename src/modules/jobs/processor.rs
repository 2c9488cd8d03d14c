use crate::modules::jobs::handlers::JobHandlers;
use crate::modules::jobs::{
    model::JobMeta,
    updater::{self, JobStatusUpdater},
};
use crate::modules::settings::cli::SETTINGS;
use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, warn};

const DISPATCH_CHANNEL_CAPACITY: usize = 200;
const HEARTBEAT_INTERVAL_MS: u64 = 10_000;

pub enum Package {
    PoisonPill,
    Job(Box<JobMeta>),
}

impl Package {
    pub fn job(job: JobMeta) -> Self {
        Package::Job(Box::new(job))
    }
}

/// One processor per queue: accepts claimed jobs and executes them behind a
/// semaphore bounding that queue's worker concurrency. Dispatch blocks on a
/// free worker slot, so a saturated queue exerts backpressure on the poll
/// loop instead of piling jobs into memory.
pub struct JobProcessor {
    channel: mpsc::Sender<Package>,
}

impl JobProcessor {
    pub fn new(
        queue_name: String,
        limit: usize,
        handlers: Arc<JobHandlers>,
        status_updater: Arc<JobStatusUpdater>,
    ) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Package>(DISPATCH_CHANNEL_CAPACITY);
        let semaphore = Arc::new(Semaphore::new(limit));

        let instance = JobProcessor { channel: sender };

        tokio::spawn(async move {
            let mut workers_in_flight: Vec<JoinHandle<()>> = Vec::new();

            while let Some(package) = receiver.recv().await {
                match package {
                    Package::PoisonPill => {
                        warn!(
                            "Queue '{}' draining: {} jobs still in flight.",
                            queue_name,
                            workers_in_flight.len()
                        );
                        for worker in workers_in_flight {
                            if let Err(e) = worker.await {
                                error!("Job execution failed during drain: {:?}", e);
                            }
                        }
                        status_updater
                            .queue(updater::UpdateRequest::PoisonPill)
                            .await;
                        break;
                    }
                    Package::Job(job) => {
                        let permit = match semaphore.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };
                        workers_in_flight.retain(|worker| !worker.is_finished());
                        let worker = Self::spawn_job(
                            job,
                            permit,
                            handlers.clone(),
                            status_updater.clone(),
                            queue_name.clone(),
                        );
                        workers_in_flight.push(worker);
                    }
                }
            }
        });

        instance
    }

    pub async fn accept(&self, package: Package) {
        if let Err(e) = self.channel.send(package).await {
            error!("Failed to queue job package. Channel error: {:?}", e);
        }
    }

    fn spawn_job(
        job: Box<JobMeta>,
        permit: OwnedSemaphorePermit,
        handlers: Arc<JobHandlers>,
        status_updater: Arc<JobStatusUpdater>,
        queue_name: String,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let _permit = permit;
            let job_id = job.id;
            let job_key = job.job_key.clone();
            let user_id = job.user_id.clone();
            let result = Self::monitor_job_execution(
                handlers.execute(*job.clone()),
                job_id,
                &user_id,
                &job_key,
                status_updater.clone(),
            )
            .await;

            status_updater
                .queue(updater::UpdateRequest::ExecutionResult(
                    queue_name, job, result,
                ))
                .await
        })
    }

    /// Drives the job future while emitting heartbeats so the status store
    /// can tell a live job from a wedged one, and warns as the job burns
    /// through its execution budget.
    async fn monitor_job_execution<F>(
        future: F,
        job_id: u64,
        user_id: &str,
        job_name: &str,
        status_updater: Arc<JobStatusUpdater>,
    ) -> F::Output
    where
        F: Future,
    {
        let budget = Duration::from_secs(SETTINGS.mailsweep_job_timeout_seconds);
        let mut interval = tokio::time::interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
        let mut future = std::pin::pin!(future);
        let start_time = Instant::now();
        let mut warned_half_budget = false;
        let mut warned_low_budget = false;

        loop {
            tokio::select! {
                output = &mut future => {
                    return output;
                },

                _ = interval.tick() => {
                    let elapsed = start_time.elapsed();
                    if !warned_half_budget && elapsed >= budget / 2 {
                        warned_half_budget = true;
                        warn!(
                            "Job {{'{job_name}'-{job_id}}} has used half of its {:?} execution budget",
                            budget
                        );
                    }
                    if !warned_low_budget && elapsed >= budget.mul_f64(0.9) {
                        warned_low_budget = true;
                        warn!(
                            "Job {{'{job_name}'-{job_id}}} has {:?} left before it is failed with a timeout",
                            budget.saturating_sub(elapsed)
                        );
                    }

                    status_updater
                        .queue(updater::UpdateRequest::Heartbeat(user_id.to_string(), job_id))
                        .await
                }
            }
        }
    }
}
