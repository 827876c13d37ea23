use crate::{
    adapter::SiteAdapter,
    config::CrawlConfig,
    error::Result,
    extractor::DetailExtractor,
    limiter::ConcurrencyLimiter,
    record::PartnerRecord,
    session::CrawlSession,
    task::{Candidate, CrawlTask},
};
use futures::future::join_all;
use std::{future::Future, sync::atomic::Ordering, sync::Arc};
use tokio::time::{sleep, Instant};
use tokio_util::task::TaskTracker;

pub mod statistics;

pub struct Crawler {
    config: CrawlConfig,
}

impl Crawler {
    pub fn new(config: CrawlConfig) -> Self {
        Self { config }
    }

    /// Crawls `adapter` to completion and returns every partner found.
    pub async fn run(&self, adapter: Arc<dyn SiteAdapter>) -> Result<Vec<PartnerRecord>> {
        let session = Arc::new(CrawlSession::new(self.config.clone()));
        run_session(adapter, session, std::future::pending::<()>()).await
    }
}

/// Runs a crawl until the discovery space is exhausted or `shutdown`
/// resolves, whichever comes first.
pub async fn run<F>(
    adapter: Arc<dyn SiteAdapter>,
    config: CrawlConfig,
    shutdown: F,
) -> Result<Vec<PartnerRecord>>
where
    F: Future + Send + 'static,
{
    run_session(adapter, Arc::new(CrawlSession::new(config)), shutdown).await
}

/// Like [`run`], with a caller-built session (e.g. one resumed from an
/// earlier run's records).
pub async fn run_session<F>(
    adapter: Arc<dyn SiteAdapter>,
    session: Arc<CrawlSession>,
    shutdown: F,
) -> Result<Vec<PartnerRecord>>
where
    F: Future + Send + 'static,
{
    session.config.validate()?;
    tracing::info!("running crawl of '{}'", adapter.name());
    let starting_time = Instant::now();

    let result = crawl(adapter.clone(), session.clone(), shutdown).await;
    adapter.shutdown().await;
    session.statistics.write_to_log(starting_time.elapsed());

    if let Some(fatal) = session.take_fatal() {
        return Err(fatal);
    }
    result?;
    if session.is_cancelled() {
        tracing::warn!("crawl cancelled, returning partial results");
    }
    Ok(session.aggregator.snapshot())
}

/// Resolves when `signal` does. A signal that could not be listened for is
/// logged and never resolves, so the crawl is not cut short by it.
pub async fn shutdown_on<F, E>(signal: F)
where
    F: Future<Output = std::result::Result<(), E>>,
    E: std::fmt::Debug,
{
    match signal.await {
        Ok(()) => return,
        Err(error) => tracing::error!("Failed to listen for event: {:?}", error),
    }
    std::future::pending::<()>().await
}

/// Shutdown on ctrl-c, for use as the `shutdown` argument of [`run`].
pub async fn ctrl_c() {
    shutdown_on(tokio::signal::ctrl_c()).await
}

async fn crawl<F>(
    adapter: Arc<dyn SiteAdapter>,
    session: Arc<CrawlSession>,
    shutdown: F,
) -> Result<()>
where
    F: Future + Send + 'static,
{
    let mut tasks = adapter.discover().await?;
    if let Some(cap) = session.config.max_pages {
        tasks.retain(|task| !matches!(task, CrawlTask::Page { index } if *index > cap));
    }
    if let Some(cap) = session.config.round_cap() {
        tasks.truncate(cap);
    }
    tracing::info!(num_rounds = tasks.len(), "discovered rounds");

    let rounds = Arc::new(ConcurrencyLimiter::new(
        "rounds",
        session.config.outer_concurrency,
    ));
    let tracker = TaskTracker::new();
    let token = session.cancellation_token();

    for task in tasks {
        let adapter = adapter.clone();
        let session = session.clone();
        let rounds = rounds.clone();
        tracker.spawn(async move {
            let _ = rounds.submit(run_round(adapter.as_ref(), &session, task)).await;
        });
    }

    tracker.close();

    tokio::select! {
        _ = tracker.wait() => {}
        _ = shutdown => {
            tracing::warn!("shutdown requested, cancelling crawl");
            token.cancel();
            rounds.close();
            tracker.wait().await;
        }
        _ = token.cancelled() => {
            rounds.close();
            tracker.wait().await;
        }
    }

    tracing::info!("crawler: all rounds finished");
    Ok(())
}

/// One outer round: collect candidates, then extract them with a fresh
/// inner limiter.
async fn run_round(adapter: &dyn SiteAdapter, session: &CrawlSession, task: CrawlTask) {
    if session.is_cancelled() {
        return;
    }
    let stats = &session.statistics;
    stats.num_rounds.fetch_add(1, Ordering::SeqCst);

    let candidates = match collect_candidates(adapter, session, &task).await {
        Ok(candidates) => candidates,
        Err(err) => {
            stats.num_round_errors.fetch_add(1, Ordering::SeqCst);
            if err.is_fatal() {
                session.abort(err);
            } else {
                tracing::warn!(round = %task, "round degraded: {}", err);
            }
            return;
        }
    };
    tracing::debug!(round = %task, num_candidates = candidates.len(), "round collected");

    let (section, value) = task.tag();
    let details = ConcurrencyLimiter::new("details", session.config.inner_concurrency);
    let extractor = DetailExtractor::new(adapter, session);
    join_all(candidates.iter().map(|candidate| {
        details.submit(extractor.extract(candidate, &section, &value))
    }))
    .await;

    let delay = session.config.round_delay();
    if !delay.is_zero() {
        sleep(delay).await;
    }
}

async fn collect_candidates(
    adapter: &dyn SiteAdapter,
    session: &CrawlSession,
    task: &CrawlTask,
) -> Result<Vec<Candidate>> {
    let mut candidates = match task {
        CrawlTask::Page { .. } => {
            let label = task.to_string();
            session
                .config
                .retry_policy()
                .run(&label, |_| adapter.crawl_round(task))
                .await?
        }
        CrawlTask::Filter { .. } => adapter.crawl_round(task).await?,
    };
    if let Some(cap) = session.config.candidate_cap() {
        candidates.truncate(cap);
    }
    Ok(candidates)
}
