//! Browser-automation seam.
//!
//! The crawler drives pages through [`BrowserPage`] and never talks to a
//! concrete automation backend. A backend provides isolated contexts
//! ([`BrowsingContext`]) that open pages with asset requests blocked.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use crate::error::{CrawlError, Result};

/// Asset types a page may refuse to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Document,
    Script,
    Stylesheet,
    Image,
    Font,
    Media,
    Other,
}

/// Blocked for every crawl page to cut load time.
pub const BLOCKED_RESOURCES: &[ResourceKind] = &[
    ResourceKind::Image,
    ResourceKind::Font,
    ResourceKind::Stylesheet,
    ResourceKind::Media,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    Load,
    #[default]
    DomContentLoaded,
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigateOptions {
    pub wait_until: WaitUntil,
    pub timeout: Duration,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            wait_until: WaitUntil::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl NavigateOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str, options: &NavigateOptions) -> Result<()>;
    async fn is_visible(&self, selector: &str) -> Result<bool>;
    /// Trimmed text content of every element matching `selector`.
    async fn texts(&self, selector: &str) -> Result<Vec<String>>;
    /// Clicks the `index`th element matching `selector`.
    async fn click_nth(&self, selector: &str, index: usize) -> Result<()>;
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;
    async fn close(&self) -> Result<()>;

    async fn text(&self, selector: &str) -> Result<String> {
        self.texts(selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CrawlError::ElementNotFound(selector.to_string()))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.click_nth(selector, 0).await
    }
}

#[async_trait]
pub trait BrowsingContext: Send + Sync + 'static {
    type Page: BrowserPage;

    async fn new_page(&self, blocked: &[ResourceKind]) -> Result<Self::Page>;
    async fn close(&self) -> Result<()>;
}

/// Polling parameters for explicit UI waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// How long an indicator gets to show up before it counts as never shown.
    pub appear_grace: Duration,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            appear_grace: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Waits for a loading indicator to go away. An indicator that never shows
/// up within the grace period is a success.
pub async fn wait_until_hidden<P: BrowserPage + ?Sized>(
    page: &P,
    selector: &str,
    options: &WaitOptions,
) -> Result<()> {
    let grace_deadline = Instant::now() + options.appear_grace;
    loop {
        if page.is_visible(selector).await? {
            break;
        }
        if Instant::now() >= grace_deadline {
            return Ok(());
        }
        sleep(options.poll_interval).await;
    }

    let deadline = Instant::now() + options.timeout;
    while page.is_visible(selector).await? {
        if Instant::now() >= deadline {
            return Err(CrawlError::timeout(selector, options.timeout));
        }
        sleep(options.poll_interval).await;
    }
    Ok(())
}

/// Tracks a series of measurements and reports when two consecutive ones match.
#[derive(Debug, Default)]
pub struct Plateau {
    last: Option<i64>,
}

impl Plateau {
    pub fn observe(&mut self, value: i64) -> bool {
        let reached = self.last == Some(value);
        self.last = Some(value);
        reached
    }
}

const SCROLL_HEIGHT_SCRIPT: &str = "document.body.scrollHeight";
const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadMoreOptions {
    pub max_steps: usize,
    pub scroll_pause: Duration,
    pub wait: WaitOptions,
}

impl Default for LoadMoreOptions {
    fn default() -> Self {
        Self {
            max_steps: 200,
            scroll_pause: Duration::from_millis(750),
            wait: WaitOptions::default(),
        }
    }
}

/// Loads every result of a listing: clicks `show_more` while it is visible,
/// otherwise scrolls to the bottom until the document height stops growing.
/// Returns the number of steps taken.
pub async fn load_all_results<P: BrowserPage + ?Sized>(
    page: &P,
    show_more: &str,
    loading: &str,
    options: &LoadMoreOptions,
) -> Result<usize> {
    let mut heights = Plateau::default();
    for step in 0..options.max_steps {
        if page.is_visible(show_more).await? {
            page.click(show_more).await?;
            wait_until_hidden(page, loading, &options.wait).await?;
            continue;
        }

        let before = scroll_height(page).await?;
        heights.observe(before);
        page.evaluate(SCROLL_TO_BOTTOM_SCRIPT).await?;
        sleep(options.scroll_pause).await;
        let after = scroll_height(page).await?;
        if heights.observe(after) {
            return Ok(step);
        }
    }
    tracing::warn!(
        max_steps = options.max_steps,
        "stopped loading results after step limit"
    );
    Ok(options.max_steps)
}

async fn scroll_height<P: BrowserPage + ?Sized>(page: &P) -> Result<i64> {
    let value = page.evaluate(SCROLL_HEIGHT_SCRIPT).await?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|height| height as i64))
        .ok_or_else(|| CrawlError::ElementNotFound("document.body.scrollHeight".into()))
}
