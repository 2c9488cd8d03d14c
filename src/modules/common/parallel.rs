use std::{future::Future, sync::Arc};
use tokio::sync::Semaphore;

use crate::{
    modules::error::{code::ErrorCode, MailSweepResult},
    raise_error,
};

/// Runs `f` over every item with at most `concurrency` futures in flight.
/// Individual results are returned in spawn order; the first join failure
/// aborts the whole call.
pub async fn run_with_limit<I, Item, Fut, F, O>(
    concurrency: usize,
    iter: I,
    f: F,
) -> MailSweepResult<Vec<O>>
where
    I: IntoIterator<Item = Item>,
    Item: Send + 'static,
    Fut: Future<Output = MailSweepResult<O>> + Send + 'static,
    F: Fn(Item) -> Fut + Send + Sync + 'static,
    O: Send + 'static,
{
    let sem = Arc::new(Semaphore::new(concurrency));
    let f = Arc::new(f);
    let mut handles = Vec::new();

    for item in iter {
        let permit = sem.clone().acquire_owned().await.map_err(|e| {
            raise_error!(
                format!("Failed to acquire semaphore: {e}"),
                ErrorCode::InternalError
            )
        })?;
        let f = f.clone();

        handles.push(tokio::spawn(async move {
            let res = f(item).await;
            drop(permit);
            res
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let res = handle.await.map_err(|e| {
            raise_error!(
                format!("Task panicked or was cancelled: {e}"),
                ErrorCode::InternalError
            )
        })?;
        results.push(res?);
    }

    Ok(results)
}
