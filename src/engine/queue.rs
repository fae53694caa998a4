//! FIFO concurrency limiter for transfers.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

use crate::engine::control::CancellationToken;
use crate::error::EngineError;

/// Bounds the number of simultaneous transfers.
///
/// Admission is FIFO; there are no priority or anti-starvation guarantees
/// beyond that. Failure of one task never cancels its siblings.
pub struct DownloadQueue {
    permits: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    limit: usize,
}

impl DownloadQueue {
    pub fn new(max_concurrent: usize) -> Self {
        let limit = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            active: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of tasks currently holding a slot.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Run one task through the queue, waiting for a free slot first.
    pub async fn run_one<F, T>(&self, task: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EngineError::Cancelled)?;
        self.active.fetch_add(1, Ordering::SeqCst);
        let result = task.await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        drop(permit);
        result
    }

    /// Run a batch with at most `limit` tasks in flight, FIFO admission.
    ///
    /// Results come back in input order. Tasks reaching the front after
    /// cancellation are not started and report `Cancelled`; tasks already
    /// running are left to observe the token themselves.
    pub async fn run_all<F, T>(
        &self,
        tasks: Vec<F>,
        token: &CancellationToken,
    ) -> Vec<Result<T, EngineError>>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let mut results: Vec<(usize, Result<T, EngineError>)> =
            stream::iter(tasks.into_iter().enumerate())
                .map(|(index, task)| async move {
                    if token.is_cancelled() {
                        return (index, Err(EngineError::Cancelled));
                    }
                    (index, self.run_one(task).await)
                })
                .buffer_unordered(self.limit)
                .collect()
                .await;
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }
}
