use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::{
    aggregator::MergeAggregator,
    config::CrawlConfig,
    crawler::statistics::Statistics,
    error::CrawlError,
    record::PartnerRecord,
};

/// Everything one crawl run shares between its rounds. Owned by the run and
/// handed to every component explicitly.
#[derive(Debug)]
pub struct CrawlSession {
    pub config: CrawlConfig,
    pub aggregator: MergeAggregator,
    pub statistics: Statistics,
    token: CancellationToken,
    fatal: Mutex<Option<CrawlError>>,
}

impl CrawlSession {
    pub fn new(config: CrawlConfig) -> Self {
        Self::resume(config, Vec::new())
    }

    /// A session whose aggregator already holds `records` from an earlier run.
    pub fn resume(config: CrawlConfig, records: Vec<PartnerRecord>) -> Self {
        if !records.is_empty() {
            tracing::info!(num_records = records.len(), "resuming with known partners");
        }
        Self {
            config,
            aggregator: MergeAggregator::with_records(records),
            statistics: Statistics::default(),
            token: CancellationToken::new(),
            fatal: Mutex::new(None),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Records the first fatal error and cancels the run.
    pub fn abort(&self, error: CrawlError) {
        tracing::error!("aborting crawl: {}", error);
        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if fatal.is_none() {
            *fatal = Some(error);
        }
        drop(fatal);
        self.token.cancel();
    }

    pub fn take_fatal(&self) -> Option<CrawlError> {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
