use std::time::Duration;

use thiserror::Error;

/// Errors raised while crawling a partner directory.
///
/// Only [`CrawlError::Discovery`], [`CrawlError::Config`] and
/// [`CrawlError::PoolExhausted`] abort a run; everything else is degraded by
/// the component that observes it.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("discovery failed for '{section}': {reason}")]
    Discovery { section: String, reason: String },

    #[error("navigation to '{url}' failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("no browsing context became available within {0:?}")]
    PoolExhausted(Duration),

    #[error("context pool is closed")]
    PoolClosed,

    #[error("crawl cancelled")]
    Cancelled,

    #[error("{adapter} cannot crawl round '{task}'")]
    UnsupportedTask { adapter: String, task: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CrawlError {
    pub fn discovery<S: Into<String>, R: ToString>(section: S, reason: R) -> Self {
        Self::Discovery {
            section: section.into(),
            reason: reason.to_string(),
        }
    }

    pub fn navigation<S: Into<String>, R: ToString>(url: S, reason: R) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unsupported_task<S: Into<String>, T: ToString>(adapter: S, task: T) -> Self {
        Self::UnsupportedTask {
            adapter: adapter.into(),
            task: task.to_string(),
        }
    }

    pub fn timeout<S: Into<String>>(what: S, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }

    /// Errors that end the whole run instead of degrading one round.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Discovery { .. } | Self::PoolExhausted(_) | Self::Config(_)
        )
    }

    /// Errors worth another attempt under a retry policy.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Cancelled
                | Self::PoolClosed
                | Self::PoolExhausted(_)
                | Self::Config(_)
                | Self::UnsupportedTask { .. }
        )
    }
}

pub type Result<T, E = CrawlError> = std::result::Result<T, E>;
