//! Concurrent batch fan-out over the fetch engine.

use std::time::Duration;

use futures::FutureExt;
use tracing::info;

use crate::engine::FetchEngine;
use crate::error::{ErrorKind, FetchFailure};
use crate::types::FetchResult;

impl FetchEngine {
    /// Fetch many URLs concurrently and independently. The result at index
    /// `i` always corresponds to `urls[i]`, whatever order completions
    /// arrive in; one URL's backoff never blocks another's progress.
    ///
    /// Per-URL faults, including panics inside the fetch pipeline, become
    /// failure results at their index. Partial failure is the normal case;
    /// the batch itself never aborts.
    pub async fn batch_fetch(&self, urls: &[String]) -> Vec<FetchResult> {
        info!(count = urls.len(), "Batch fetching");

        let tasks = urls.iter().map(|url| {
            let request = self.request(url.clone());
            async move {
                match std::panic::AssertUnwindSafe(self.fetch(&request))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(panic) => FetchResult::Failure(FetchFailure {
                        kind: ErrorKind::ClientProtocol,
                        message: format!("fetch task panicked: {}", panic_message(&panic)),
                        url: request.url.clone(),
                        elapsed: Duration::ZERO,
                    }),
                }
            }
        });

        let results = futures::future::join_all(tasks).await;

        let successful = results.iter().filter(|r| r.is_success()).count();
        info!(successful, total = urls.len(), "Batch complete");
        results
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(text) = panic.downcast_ref::<&str>() {
        text
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text
    } else {
        "unknown panic"
    }
}
