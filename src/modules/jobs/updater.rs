use crate::modules::jobs::{model::JobMeta, result::JobRunResult, store::JobStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::error;

#[derive(Debug)]
pub enum UpdateRequest {
    PoisonPill,
    Heartbeat(String, u64),
    ExecutionResult(String, Box<JobMeta>, JobRunResult),
}

/// Serializes all status-store writes behind one channel so workers never
/// contend on the store and result ordering per job is stable.
pub struct JobStatusUpdater {
    sender: mpsc::Sender<UpdateRequest>,
}

impl JobStatusUpdater {
    pub fn new<T>(job_store: Arc<T>, processor_num: usize) -> Self
    where
        T: JobStore + Send + Sync + Clone + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<UpdateRequest>(100);
        let instance = JobStatusUpdater { sender };

        tokio::spawn({
            async move {
                let mut poison_pill = 0;
                while let Some(request) = receiver.recv().await {
                    let job_store = job_store.clone();
                    match request {
                        UpdateRequest::Heartbeat(user_id, job_id) => {
                            if let Err(e) = job_store.heartbeat(&user_id, job_id).await {
                                tracing::warn!("Failed to heartbeat: {}", e);
                            }
                        }
                        UpdateRequest::ExecutionResult(queue_name, job_meta, run_result) => {
                            if let Err(e) = job_store
                                .update_execution_result(&job_meta, &run_result)
                                .await
                            {
                                error!(
                                    "Job queue '{}': Failed to update job execution status: {:?}",
                                    queue_name, e
                                );
                            }
                        }
                        UpdateRequest::PoisonPill => {
                            poison_pill += 1;
                            if poison_pill == processor_num {
                                break;
                            }
                        }
                    }
                }
            }
        });

        instance
    }

    pub async fn queue(&self, request: UpdateRequest) {
        if let Err(e) = self.sender.send(request).await {
            error!("Failed to queue job status. Channel error: {:#?}", e);
        }
    }
}
