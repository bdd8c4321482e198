//! Queue-driven analyze worker.
//!
//! Drains the work queue with bounded concurrency. The permit cap mirrors
//! the deployed reserved concurrency that protects the vision model quota.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::services::queue::{QueueError, WorkQueue};

use super::analyze::AnalyzeService;

/// Process tasks until the queue drains, running at most `concurrency`
/// pages at once. Per-page failures are already recorded on the page row;
/// the worker just keeps going.
pub async fn run_analyze_worker(
    analyze: Arc<AnalyzeService>,
    queue: Arc<dyn WorkQueue>,
    concurrency: usize,
) -> Result<(), QueueError> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::new();

    while let Some(task) = queue.receive().await? {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let analyze = analyze.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = analyze.handle(&task).await {
                tracing::error!(
                    page_id = %task.page_id,
                    page_number = task.page_number,
                    error = %err,
                    "analyze task failed"
                );
            }
        }));
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::warn!(error = %err, "analyze task panicked");
        }
    }
    Ok(())
}
