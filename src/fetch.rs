//! Plain HTTP page fetching for directories that render server-side.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CrawlError, Result};

const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; partner-crawler/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` and returns the response body as text.
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        tracing::debug!(url, "fetching");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| CrawlError::navigation(url, err))?;
        let response = response
            .error_for_status()
            .map_err(|err| CrawlError::navigation(url, err))?;
        response
            .text()
            .await
            .map_err(|err| CrawlError::navigation(url, err))
    }
}
