//! Caps the number of in-flight tasks drawn from one queue.

use std::{
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
};

use tokio::sync::Semaphore;

use crate::error::{CrawlError, Result};

/// A concurrency limiter. Waiting submissions are admitted in FIFO order as
/// slots free up; a failed task releases its slot like any other.
///
/// Instances never share slots: the crawler owns one for rounds and creates a
/// fresh one per round for detail extraction.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    name: &'static str,
    limit: usize,
    semaphore: Semaphore,
    active: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicUsize,
}

impl ConcurrencyLimiter {
    pub fn new(name: &'static str, limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            name,
            limit,
            semaphore: Semaphore::new(limit),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Waits for a free slot, then drives `task` to completion in it.
    ///
    /// Returns [`CrawlError::Cancelled`] without running the task if the
    /// limiter was closed while the submission was queued.
    pub async fn submit<F, T>(&self, task: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| CrawlError::Cancelled)?;
        let _slot = ActiveSlot::enter(self);
        Ok(task.await)
    }

    /// Rejects every queued and future submission. Running tasks finish.
    pub fn close(&self) {
        tracing::debug!(limiter = self.name, "closing limiter");
        self.semaphore.close();
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of tasks observed running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

struct ActiveSlot<'a> {
    limiter: &'a ConcurrencyLimiter,
}

impl<'a> ActiveSlot<'a> {
    fn enter(limiter: &'a ConcurrencyLimiter) -> Self {
        let now = limiter.active.fetch_add(1, Ordering::SeqCst) + 1;
        limiter.peak.fetch_max(now, Ordering::SeqCst);
        Self { limiter }
    }
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        self.limiter.active.fetch_sub(1, Ordering::SeqCst);
        self.limiter.completed.fetch_add(1, Ordering::SeqCst);
    }
}
