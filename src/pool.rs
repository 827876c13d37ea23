//! A fixed-size pool of isolated browsing contexts.

use std::{
    collections::VecDeque,
    ops::Deref,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures::future::join_all;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{
    browser::BrowsingContext,
    config::CrawlConfig,
    error::{CrawlError, Result},
};

/// Hands out browsing contexts exclusively. A caller waits on a semaphore
/// until a context is free; the [`PooledContext`] guard returns it on drop,
/// including when the caller errors out.
pub struct ContextPool<C> {
    inner: Arc<PoolInner<C>>,
}

struct PoolInner<C> {
    free: Mutex<VecDeque<Arc<C>>>,
    all: Vec<Arc<C>>,
    permits: Arc<Semaphore>,
    acquire_timeout: Option<Duration>,
}

impl<C> Clone for ContextPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: BrowsingContext> ContextPool<C> {
    pub fn new(contexts: Vec<C>, acquire_timeout: Option<Duration>) -> Self {
        let all: Vec<Arc<C>> = contexts.into_iter().map(Arc::new).collect();
        let permits = Arc::new(Semaphore::new(all.len()));
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(all.iter().cloned().collect()),
                all,
                permits,
                acquire_timeout,
            }),
        }
    }

    /// Creates `size` contexts with `create`, failing if any of them fails.
    pub async fn launch<F, Fut>(
        size: usize,
        acquire_timeout: Option<Duration>,
        mut create: F,
    ) -> Result<Self>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<C>>,
    {
        let mut contexts = Vec::with_capacity(size);
        for index in 0..size {
            contexts.push(create(index).await?);
        }
        tracing::info!(size, "context pool launched");
        Ok(Self::new(contexts, acquire_timeout))
    }

    /// Launches `poolSize` contexts that time out after `poolAcquireTimeoutMs`.
    pub async fn from_config<F, Fut>(config: &CrawlConfig, create: F) -> Result<Self>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<C>>,
    {
        Self::launch(config.pool_size(), config.pool_acquire_timeout(), create).await
    }

    pub fn size(&self) -> usize {
        self.inner.all.len()
    }

    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Waits for a free context. Fails with [`CrawlError::PoolExhausted`]
    /// when an acquire timeout is configured and elapses.
    pub async fn acquire(&self) -> Result<PooledContext<C>> {
        let permits = self.inner.permits.clone();
        let permit = match self.inner.acquire_timeout {
            Some(limit) => tokio::time::timeout(limit, permits.acquire_owned())
                .await
                .map_err(|_| CrawlError::PoolExhausted(limit))?,
            None => permits.acquire_owned().await,
        }
        .map_err(|_| CrawlError::PoolClosed)?;

        let context = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or(CrawlError::PoolClosed)?;

        Ok(PooledContext {
            context,
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Closes every context, free or in use. Later acquisitions fail.
    pub async fn destroy_all(&self) {
        self.inner.permits.close();
        let results = join_all(self.inner.all.iter().map(|context| context.close())).await;
        let failures = results.iter().filter(|result| result.is_err()).count();
        if failures > 0 {
            tracing::warn!(failures, "some browsing contexts failed to close");
        }
        tracing::info!(size = self.size(), "context pool destroyed");
    }
}

/// Exclusive use of one pooled context.
pub struct PooledContext<C> {
    context: Arc<C>,
    pool: Arc<PoolInner<C>>,
    // Dropped after the context is back on the free list.
    _permit: OwnedSemaphorePermit,
}

impl<C> Deref for PooledContext<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.context
    }
}

impl<C> Drop for PooledContext<C> {
    fn drop(&mut self) {
        self.pool
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(self.context.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::future::join_all;

    use super::*;
    use crate::browser::{BrowserPage, NavigateOptions, ResourceKind};

    #[derive(Default)]
    struct CountingContext {
        in_use: AtomicBool,
        closed: AtomicBool,
    }

    struct NoPage;

    #[async_trait]
    impl BrowserPage for NoPage {
        async fn navigate(&self, url: &str, _options: &NavigateOptions) -> Result<()> {
            Err(CrawlError::navigation(url, "no pages in this test"))
        }
        async fn is_visible(&self, _selector: &str) -> Result<bool> {
            Ok(false)
        }
        async fn texts(&self, _selector: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn click_nth(&self, selector: &str, _index: usize) -> Result<()> {
            Err(CrawlError::ElementNotFound(selector.to_string()))
        }
        async fn evaluate(&self, _script: &str) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl BrowsingContext for CountingContext {
        type Page = NoPage;

        async fn new_page(&self, _blocked: &[ResourceKind]) -> Result<NoPage> {
            Ok(NoPage)
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_hands_out_more_than_pool_size() {
        let pool = ContextPool::launch(3, None, |_| async { Ok(CountingContext::default()) })
            .await
            .unwrap();
        let in_use = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let (pool_ref, in_use, peak) = (&pool, &in_use, &peak);

        join_all((0..20).map(move |_| async move {
            let context = pool_ref.acquire().await.unwrap();
            assert!(!context.in_use.swap(true, Ordering::SeqCst), "context shared");
            let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            in_use.fetch_sub(1, Ordering::SeqCst);
            context.in_use.store(false, Ordering::SeqCst);
        }))
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(pool.available(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn pool_follows_config() {
        let config = CrawlConfig {
            pool_size: Some(2),
            pool_acquire_timeout_ms: Some(100),
            ..CrawlConfig::default()
        };
        let pool = ContextPool::from_config(&config, |_| async { Ok(CountingContext::default()) })
            .await
            .unwrap();
        assert_eq!(pool.size(), 2);

        let _held = (pool.acquire().await.unwrap(), pool.acquire().await.unwrap());
        assert!(matches!(
            pool.acquire().await,
            Err(CrawlError::PoolExhausted(after)) if after == Duration::from_millis(100)
        ));

        let unsized_pool = ContextPool::from_config(
            &CrawlConfig {
                outer_concurrency: 3,
                ..CrawlConfig::default()
            },
            |_| async { Ok(CountingContext::default()) },
        )
        .await
        .unwrap();
        assert_eq!(unsized_pool.size(), 3);
    }

    #[tokio::test]
    async fn context_is_released_on_error_path() {
        let pool = ContextPool::new(vec![CountingContext::default()], None);

        async fn failing_use(pool: &ContextPool<CountingContext>) -> Result<()> {
            let context = pool.acquire().await?;
            let page = context.new_page(&[]).await?;
            page.navigate("https://x", &NavigateOptions::default()).await
        }

        assert!(failing_use(&pool).await.is_err());
        assert_eq!(pool.available(), 1);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out_when_exhausted() {
        let pool = ContextPool::new(
            vec![CountingContext::default()],
            Some(Duration::from_millis(50)),
        );
        let _held = pool.acquire().await.unwrap();
        assert!(matches!(
            pool.acquire().await,
            Err(CrawlError::PoolExhausted(_))
        ));
    }

    #[tokio::test]
    async fn destroy_all_closes_free_and_in_use_contexts() {
        let pool = ContextPool::new(
            vec![CountingContext::default(), CountingContext::default()],
            None,
        );
        let held = pool.acquire().await.unwrap();
        pool.destroy_all().await;

        assert!(held.closed.load(Ordering::SeqCst));
        assert!(pool.inner.all.iter().all(|c| c.closed.load(Ordering::SeqCst)));
        drop(held);
        assert!(matches!(pool.acquire().await, Err(CrawlError::PoolClosed)));
    }
}
