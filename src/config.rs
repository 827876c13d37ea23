use std::{fs, io, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{CrawlError, Result},
    record::{Field, FieldSet},
    retry::RetryPolicy,
};

/// Rounds kept when `testing_mode` is on.
pub const TESTING_MAX_ROUNDS: usize = 2;
/// Candidates kept per round when `testing_mode` is on.
pub const TESTING_MAX_CANDIDATES: usize = 5;

pub const DEFAULT_OUTER_CONCURRENCY: usize = 8;
pub const DEFAULT_INNER_CONCURRENCY: usize = 40;

/// Options for one crawl run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CrawlConfig {
    pub fields_to_scrape: FieldSet,
    /// Caps rounds and candidates for fast iteration.
    pub testing_mode: bool,
    pub outer_concurrency: usize,
    pub inner_concurrency: usize,
    /// Operator cap on discovered listing pages.
    pub max_pages: Option<usize>,
    /// Total attempts for a listing page, including the first.
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub navigation_timeout_ms: u64,
    /// Fixed pause after each round.
    pub round_delay_ms: u64,
    /// Browsing contexts; defaults to `outer_concurrency`.
    pub pool_size: Option<usize>,
    pub pool_acquire_timeout_ms: Option<u64>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            fields_to_scrape: FieldSet::new(),
            testing_mode: false,
            outer_concurrency: DEFAULT_OUTER_CONCURRENCY,
            inner_concurrency: DEFAULT_INNER_CONCURRENCY,
            max_pages: None,
            retry_attempts: 3,
            retry_base_delay_ms: 1000,
            navigation_timeout_ms: 30_000,
            round_delay_ms: 0,
            pool_size: None,
            pool_acquire_timeout_ms: None,
        }
    }
}

impl CrawlConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let config: CrawlConfig = serde_json::from_reader(io::BufReader::new(file))?;
        config.validate()?;
        tracing::info!("read crawl config from '{}'", path.display());
        Ok(config)
    }

    pub fn with_fields<I: IntoIterator<Item = Field>>(mut self, fields: I) -> Self {
        self.fields_to_scrape = fields.into_iter().collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.outer_concurrency == 0 {
            return Err(CrawlError::Config("outerConcurrency must be at least 1".into()));
        }
        if self.inner_concurrency == 0 {
            return Err(CrawlError::Config("innerConcurrency must be at least 1".into()));
        }
        if self.retry_attempts == 0 {
            return Err(CrawlError::Config("retryAttempts must be at least 1".into()));
        }
        if self.pool_size == Some(0) {
            return Err(CrawlError::Config("poolSize must be at least 1".into()));
        }
        if self.max_pages == Some(0) {
            return Err(CrawlError::Config("maxPages must be at least 1".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn round_delay(&self) -> Duration {
        Duration::from_millis(self.round_delay_ms)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size.unwrap_or(self.outer_concurrency)
    }

    pub fn pool_acquire_timeout(&self) -> Option<Duration> {
        self.pool_acquire_timeout_ms.map(Duration::from_millis)
    }

    pub fn round_cap(&self) -> Option<usize> {
        self.testing_mode.then_some(TESTING_MAX_ROUNDS)
    }

    pub fn candidate_cap(&self) -> Option<usize> {
        self.testing_mode.then_some(TESTING_MAX_CANDIDATES)
    }
}
