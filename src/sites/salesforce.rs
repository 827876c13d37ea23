//! AppExchange consultant directory, crawled filter by filter in a browser.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::{
    adapter::SiteAdapter,
    browser::{
        load_all_results, wait_until_hidden, BrowserPage, BrowsingContext, LoadMoreOptions,
        NavigateOptions, WaitOptions, BLOCKED_RESOURCES,
    },
    config::CrawlConfig,
    discovery::{filter_tasks, labels_match, normalize_filter_label},
    error::{CrawlError, Result},
    extractor::field_or_sentinel,
    pool::ContextPool,
    record::{AttributeValue, Field, FieldSet, PartnerRecord, NO_NAME},
    task::{Candidate, CrawlTask},
};

pub const DIRECTORY_URL: &str = "https://appexchange.salesforce.com/consulting";
pub const SECTIONS: [&str; 2] = ["Salesforce Expertise", "Industry Expertise"];

mod selectors {
    pub const SECTION: &str = ".filter-section";
    pub const SECTION_TITLE: &str = ".filter-section .filter-section__title";
    pub const SHOW_ALL: &str = "button.filter-section__show-all";
    pub const OPTION: &str = "label.filter-option";
    pub const APPLY: &str = "button.filters-apply";
    pub const CLEAR: &str = "button.filters-clear";
    pub const LOADING: &str = ".results-loading";
    pub const SHOW_MORE: &str = "button.results-show-more";

    pub const NAME: &str = "h1.partner-header__name";
    pub const TAGLINE: &str = ".partner-header__tagline";
    pub const DESCRIPTION: &str = ".partner-overview__description";
    pub const EXTENDED_DESCRIPTION: &str = ".partner-overview__extended";
    pub const EXPERTISE: &str = ".partner-expertise li";
    pub const INDUSTRIES: &str = ".partner-industries li";
    pub const SERVICES: &str = ".partner-services li";
    pub const COUNTRIES: &str = ".partner-locations .partner-location__country";
}

const COLLECT_RESULTS_SCRIPT: &str = r#"Array.from(document.querySelectorAll('.results-grid a.partner-tile')).map(a => ({
    name: (a.querySelector('.partner-tile__name') || a).textContent.trim(),
    link: a.href
}))"#;

#[derive(Debug, Deserialize)]
struct Tile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    link: String,
}

pub struct SalesforceDirectory<C> {
    pool: ContextPool<C>,
    directory_url: String,
    sections: Vec<String>,
    navigation: NavigateOptions,
    wait: WaitOptions,
    load_more: LoadMoreOptions,
}

impl<C: BrowsingContext> SalesforceDirectory<C> {
    pub fn new(pool: ContextPool<C>, config: &CrawlConfig) -> Self {
        let navigation = NavigateOptions::with_timeout(config.navigation_timeout());
        let wait = WaitOptions {
            timeout: config.navigation_timeout(),
            ..WaitOptions::default()
        };
        Self {
            pool,
            directory_url: DIRECTORY_URL.to_string(),
            sections: SECTIONS.iter().map(|s| s.to_string()).collect(),
            navigation,
            wait,
            load_more: LoadMoreOptions {
                wait,
                ..LoadMoreOptions::default()
            },
        }
    }

    /// Launches a context pool sized and timed by `config` and crawls with it.
    pub async fn launch<F, Fut>(config: &CrawlConfig, create: F) -> Result<Self>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<C>>,
    {
        let pool = ContextPool::from_config(config, create).await?;
        Ok(Self::new(pool, config))
    }

    pub fn with_directory_url<S: Into<String>>(mut self, url: S) -> Self {
        self.directory_url = url.into();
        self
    }

    pub fn with_sections<I, S>(mut self, sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sections = sections.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_load_more(mut self, load_more: LoadMoreOptions) -> Self {
        self.wait = load_more.wait;
        self.load_more = load_more;
        self
    }

    async fn open_directory(&self, page: &C::Page) -> Result<()> {
        page.navigate(&self.directory_url, &self.navigation).await?;
        wait_until_hidden(page, selectors::LOADING, &self.wait).await
    }

    /// Selector scoping the filter section titled `section`.
    async fn locate_section(&self, page: &C::Page, section: &str) -> Result<String> {
        let titles = page.texts(selectors::SECTION_TITLE).await?;
        let position = titles
            .iter()
            .position(|title| labels_match(title, section))
            .ok_or_else(|| CrawlError::discovery(section, "filter section not found"))?;
        Ok(format!("{}:nth-of-type({})", selectors::SECTION, position + 1))
    }

    /// Expands a collapsed section and returns its raw option labels.
    async fn section_options(&self, page: &C::Page, section: &str) -> Result<(String, Vec<String>)> {
        let scope = self.locate_section(page, section).await?;
        let show_all = format!("{scope} {}", selectors::SHOW_ALL);
        if page.is_visible(&show_all).await? {
            page.click(&show_all).await?;
        }
        let options = format!("{scope} {}", selectors::OPTION);
        let labels = page.texts(&options).await?;
        Ok((options, labels))
    }

    /// Filter tasks for every section that could be read. Fails only when
    /// no section could be located at all.
    async fn discover_sections(&self, page: &C::Page) -> Result<Vec<CrawlTask>> {
        self.open_directory(page).await?;
        let mut tasks = Vec::new();
        let mut failures = Vec::new();
        for section in &self.sections {
            match self.section_options(page, section).await {
                Ok((_, labels)) => {
                    let found = filter_tasks(section, labels);
                    tracing::info!(section = section.as_str(), num_filters = found.len(), "filters discovered");
                    tasks.extend(found);
                }
                Err(err) => {
                    tracing::warn!(section = section.as_str(), "skipping filter section: {}", err);
                    failures.push(err);
                }
            }
        }
        if !self.sections.is_empty() && failures.len() == self.sections.len() {
            return Err(failures.remove(0));
        }
        Ok(tasks)
    }

    async fn filter_round(&self, page: &C::Page, section: &str, value: &str) -> Result<Vec<Candidate>> {
        self.open_directory(page).await?;
        let (options, labels) = self
            .section_options(page, section)
            .await
            .map_err(|err| CrawlError::navigation(&self.directory_url, err))?;
        let position = labels
            .iter()
            .position(|label| {
                normalize_filter_label(label).is_some_and(|label| labels_match(&label, value))
            })
            .ok_or_else(|| CrawlError::ElementNotFound(format!("filter option '{value}'")))?;

        page.click_nth(&options, position).await?;
        page.click(selectors::APPLY).await?;
        wait_until_hidden(page, selectors::LOADING, &self.wait).await?;
        load_all_results(page, selectors::SHOW_MORE, selectors::LOADING, &self.load_more).await?;

        let candidates = collect_candidates(page).await;
        self.reset_filters(page).await;
        candidates
    }

    /// Clears the applied filter; selections otherwise stick to the context.
    async fn reset_filters(&self, page: &C::Page) {
        let reset = async {
            if page.is_visible(selectors::CLEAR).await? {
                page.click(selectors::CLEAR).await?;
                wait_until_hidden(page, selectors::LOADING, &self.wait).await?;
            }
            Ok::<_, CrawlError>(())
        };
        if let Err(err) = reset.await {
            tracing::debug!("could not reset filters: {}", err);
        }
    }

    async fn detail(&self, page: &C::Page, candidate: &Candidate, fields: &FieldSet) -> Result<PartnerRecord> {
        page.navigate(&candidate.link, &self.navigation).await?;
        let name = page
            .text(selectors::NAME)
            .await
            .unwrap_or_else(|_| NO_NAME.to_string());
        let mut record = PartnerRecord::new(candidate.link.as_str(), name);
        for field in fields {
            let value = read_field(page, *field).await;
            record
                .attributes
                .insert(field.key().to_string(), field_or_sentinel(*field, value));
        }
        record.scraped_at = Some(Utc::now());
        Ok(record)
    }
}

async fn collect_candidates<P: BrowserPage + ?Sized>(page: &P) -> Result<Vec<Candidate>> {
    let value = page.evaluate(COLLECT_RESULTS_SCRIPT).await?;
    let tiles: Vec<Tile> = serde_json::from_value(value)?;
    Ok(tiles
        .into_iter()
        .filter(|tile| !tile.link.trim().is_empty())
        .map(|tile| Candidate::new(tile.name, &tile.link))
        .collect())
}

async fn read_field<P: BrowserPage + ?Sized>(page: &P, field: Field) -> Result<AttributeValue> {
    let list = |selector: &'static str| async move { page.texts(selector).await.map(AttributeValue::List) };
    match field {
        Field::Tagline => page.text(selectors::TAGLINE).await.map(AttributeValue::Text),
        Field::Description => page.text(selectors::DESCRIPTION).await.map(AttributeValue::Text),
        Field::ExtendedDescription => page
            .text(selectors::EXTENDED_DESCRIPTION)
            .await
            .map(AttributeValue::Text),
        Field::Expertise => list(selectors::EXPERTISE).await,
        Field::Industries => list(selectors::INDUSTRIES).await,
        Field::Services => list(selectors::SERVICES).await,
        Field::Countries => list(selectors::COUNTRIES).await,
    }
}

async fn close_page<P: BrowserPage + ?Sized>(page: &P) {
    if let Err(err) = page.close().await {
        tracing::debug!("failed to close page: {}", err);
    }
}

#[async_trait]
impl<C: BrowsingContext> SiteAdapter for SalesforceDirectory<C> {
    fn name(&self) -> String {
        "salesforce".to_string()
    }

    async fn discover(&self) -> Result<Vec<CrawlTask>> {
        let context = self.pool.acquire().await?;
        let page = context.new_page(BLOCKED_RESOURCES).await?;
        let result = self.discover_sections(&page).await;
        close_page(&page).await;
        result
    }

    async fn crawl_round(&self, task: &CrawlTask) -> Result<Vec<Candidate>> {
        let CrawlTask::Filter { section, value } = task else {
            return Err(CrawlError::unsupported_task(self.name(), task));
        };
        let context = self.pool.acquire().await?;
        let page = context.new_page(BLOCKED_RESOURCES).await?;
        let result = self.filter_round(&page, section, value).await;
        close_page(&page).await;
        result
    }

    async fn extract_detail(&self, candidate: &Candidate, fields: &FieldSet) -> Result<PartnerRecord> {
        let context = self.pool.acquire().await?;
        let page = context.new_page(BLOCKED_RESOURCES).await?;
        let result = self.detail(&page, candidate, fields).await;
        close_page(&page).await;
        result
    }

    async fn shutdown(&self) {
        self.pool.destroy_all().await;
    }
}
