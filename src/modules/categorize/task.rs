// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::modules::categorize::{CategorizationPipeline, CategorizeRequest};
use crate::modules::jobs::task::{Job, JobContext, JobFuture};
use crate::modules::user::scope::UserScope;

pub const CATEGORIZE_QUEUE: &str = "categorize_queue";

/// Queue payload for one categorization run over a user's candidate set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategorizeJob {
    pub user_id: String,
    pub request: CategorizeRequest,
}

impl Job for CategorizeJob {
    const JOB_KEY: &'static str = "categorize_emails";
    const JOB_QUEUE: &'static str = CATEGORIZE_QUEUE;

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn priority(&self) -> u8 {
        40
    }

    fn run(self, context: JobContext) -> JobFuture {
        Box::pin(async move {
            let scope = UserScope {
                user_id: context.user_id.clone(),
                db: context.db.clone(),
                cancel: context.cancel.clone(),
            };

            // Progress callbacks arrive from analysis workers; forward them
            // to the status store off the hot path.
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<u8>();
            let forwarder_context = context.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(progress) = rx.recv().await {
                    forwarder_context.report_progress(progress, None).await;
                }
            });

            let pipeline = CategorizationPipeline::for_user(&scope).await?;
            let progress_fn = move |progress: u8| {
                let _ = tx.send(progress);
            };
            let result = pipeline
                .categorize(&scope, self.request.clone(), Some(&progress_fn))
                .await;
            forwarder.abort();
            let result = result?;

            Ok(json!({
                "processed": result.processed,
                "errors": result.errors,
                "categories": result.categories,
                "analyzer_insights": result.analyzer_insights,
            }))
        })
    }
}
