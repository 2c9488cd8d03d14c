use crate::modules::common::signal::SIGNAL_MANAGER;
use crate::modules::jobs::handlers::JobHandlers;
use crate::modules::jobs::model::JobMeta;
use crate::modules::jobs::processor::{JobProcessor, Package};
use crate::modules::jobs::store::JobStore;
use crate::modules::jobs::updater::JobStatusUpdater;
use crate::modules::settings::cli::SETTINGS;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const MAX_IDLE_BACKOFF_MULTIPLIER: u32 = 16;

/// Polls the durable queue and routes claimed jobs to per-queue
/// processors. The poll interval backs off exponentially while the queue
/// is empty and resets on any claim.
pub struct JobFlow<T>
where
    T: JobStore + Send + Sync + Clone + 'static,
{
    job_store: Arc<T>,
    processors: Arc<DashMap<String, JobProcessor>>,
}

impl<T> JobFlow<T>
where
    T: JobStore + Send + Sync + Clone + 'static,
{
    pub fn new(
        job_store: Arc<T>,
        queue_concurrency: &DashMap<String, usize>,
        handlers: Arc<JobHandlers>,
        status_updater: Arc<JobStatusUpdater>,
    ) -> Self {
        let processors = DashMap::new();
        for entry in queue_concurrency.iter() {
            let queue = entry.key().to_string();
            let processor = JobProcessor::new(
                queue.clone(),
                *entry.value(),
                handlers.clone(),
                status_updater.clone(),
            );
            processors.insert(queue, processor);
        }

        Self {
            job_store,
            processors: Arc::new(processors),
        }
    }

    pub async fn start(self: Arc<Self>) {
        let job_store = self.job_store.clone();
        let processors = self.processors.clone();
        let mut shutdown = SIGNAL_MANAGER.subscribe();
        let base_poll = Duration::from_millis(SETTINGS.mailsweep_queue_poll_interval_ms);
        tokio::spawn(async move {
            let mut idle_multiplier: u32 = 1;
            loop {
                let sleep = base_poll * idle_multiplier;
                tokio::select! {
                    _ = tokio::time::sleep(sleep) => {
                        match job_store.clone().fetch_pending_jobs().await {
                            Ok(jobs) => {
                                idle_multiplier = if jobs.is_empty() {
                                    (idle_multiplier * 2).min(MAX_IDLE_BACKOFF_MULTIPLIER)
                                } else {
                                    1
                                };

                                let mut queued_jobs: HashMap<String, Vec<JobMeta>> = HashMap::new();
                                for job in jobs {
                                    queued_jobs
                                        .entry(job.queue_name.clone())
                                        .or_default()
                                        .push(job);
                                }

                                for (queue, jobs) in queued_jobs {
                                    if let Err(e) = Self::send_jobs_to_channel(processors.clone(), &queue, jobs).await {
                                        error!(
                                            "Error sending jobs to channel for queue '{}': {:?}",
                                            queue, e
                                        );
                                    }
                                }
                            }
                            Err(e) => {
                                error!("Failed to fetch jobs: {:?}", e);
                                idle_multiplier = (idle_multiplier * 2).min(MAX_IDLE_BACKOFF_MULTIPLIER);
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Stopping queue polling.");
                        Self::send_poison(processors.clone()).await;
                        break;
                    }
                }
            }
        });
    }

    async fn send_jobs_to_channel(
        processors: Arc<DashMap<String, JobProcessor>>,
        queue_name: &str,
        jobs: Vec<JobMeta>,
    ) -> Result<(), String> {
        let processor = processors.get(queue_name).ok_or_else(|| format!(
            "Processor for queue '{}' not found. You may have forgotten to call `.register::<MyJob>()` on the queue.",
            queue_name
        ))?;

        for job in jobs {
            processor.accept(Package::job(job)).await;
        }

        Ok(())
    }

    async fn send_poison(processors: Arc<DashMap<String, JobProcessor>>) {
        for entry in processors.iter() {
            entry.value().accept(Package::PoisonPill).await;
        }
    }
}
