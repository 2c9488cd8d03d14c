use crate::modules::jobs::store::JobStore;
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

use crate::modules::common::signal::SIGNAL_MANAGER;

/// Periodically removes terminal jobs older than the retention window.
pub struct JobCleaner<T>
where
    T: JobStore + Send + Sync + Clone + 'static,
{
    store: Arc<T>,
}

impl<T> JobCleaner<T>
where
    T: JobStore + Send + Sync + Clone + 'static,
{
    pub fn new(store: Arc<T>) -> Self {
        Self { store }
    }

    pub fn start(self, interval: Duration) {
        let store = self.store;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut shutdown = SIGNAL_MANAGER.subscribe();
            ticker.tick().await; // discard the immediate first tick
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = store.cleanup().await {
                            error!("Job cleanup pass failed: {:?}", e);
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Job cleaner shutting down");
                        break;
                    }
                }
            }
        });
    }
}
