//! Bounded pool for blocking provider calls.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use super::error::CacheError;

/// Runs blocking closures on tokio's blocking threads, at most `size` at a time.
///
/// Each call holds a semaphore permit for the whole duration of the closure,
/// including after the awaiting caller has given up on it. Shutdown therefore
/// waits for orphaned work as well as awaited work.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool with `size` execution slots.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(size)), size }
    }

    /// Number of calls currently holding a slot.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Returns `true` once `shutdown` has completed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Run `task` on the blocking pool once a slot is free.
    ///
    /// # Errors
    /// Returns `CacheError::PoolClosed` after shutdown, or `CacheError::Worker`
    /// if the closure panicked.
    pub async fn run<F, T>(&self, task: F) -> Result<T, CacheError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit =
            Arc::clone(&self.permits).acquire_owned().await.map_err(|_| CacheError::PoolClosed)?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        });

        handle.await.map_err(|e| CacheError::Worker(e.to_string()))
    }

    /// Wait for every slot to drain, then refuse further work.
    ///
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        if self.is_closed() {
            return;
        }

        let slots = u32::try_from(self.size).unwrap_or(u32::MAX);
        debug!(in_flight = self.in_flight(), "Draining worker pool");

        // Holding every permit means nothing is running.
        let drained = self.permits.acquire_many(slots).await;
        self.permits.close();
        drop(drained);
    }

    /// Refuse further work without waiting for in-flight calls.
    pub(crate) fn close_now(&self) {
        self.permits.close();
    }
}
