//! Shopify partner directory, crawled page by page over plain HTTP.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::{
    adapter::SiteAdapter,
    discovery::{content_fingerprint, highest_page_number, page_tasks},
    error::{CrawlError, Result},
    extractor::field_or_sentinel,
    fetch::PageFetcher,
    record::{AttributeValue, Field, FieldSet, PartnerRecord, NO_NAME},
    task::{Candidate, CrawlTask},
};

pub const LISTING_URL: &str = "https://www.shopify.com/partners/directory/services";
pub const PARTNER_LINK_PATTERN: &str = "/partners/directory/partner/";

mod selectors {
    pub const PAGINATION: &str = "nav[aria-label='Pagination'] a, nav[aria-label='Pagination'] span";
    pub const LINK: &str = "a[href]";
    pub const TILE_NAME: &str = "h3, [data-partner-name]";

    pub const NAME: &str = "h1";
    pub const TAGLINE: &str = "[data-testid='partner-tagline'], .partner-tagline";
    pub const DESCRIPTION: &str = ".partner-description p";
    pub const EXTENDED_DESCRIPTION: &str = ".partner-about";
    pub const EXPERTISE: &str = ".partner-specialties li";
    pub const INDUSTRIES: &str = ".partner-industries li";
    pub const SERVICES: &str = ".partner-services li";
    pub const COUNTRIES: &str = ".partner-locations li";
}

pub struct ShopifyDirectory<F> {
    fetcher: F,
    listing_url: String,
    /// Fingerprint of page 1's partner links.
    first_page: Mutex<Option<String>>,
}

impl<F: PageFetcher> ShopifyDirectory<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            listing_url: LISTING_URL.to_string(),
            first_page: Mutex::new(None),
        }
    }

    pub fn with_listing_url<S: Into<String>>(mut self, url: S) -> Self {
        self.listing_url = url.into();
        self
    }

    pub fn page_url(&self, index: usize) -> String {
        let separator = if self.listing_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}page={index}", self.listing_url)
    }

    fn remember_first_page(&self, candidates: &[Candidate]) {
        *self.first_page.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(links_fingerprint(candidates));
    }

    /// Out-of-range pages on this directory repeat page 1.
    fn repeats_first_page(&self, candidates: &[Candidate]) -> bool {
        self.first_page
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .is_some_and(|first| first == links_fingerprint(candidates))
    }
}

fn links_fingerprint(candidates: &[Candidate]) -> String {
    let links: Vec<&str> = candidates.iter().map(|c| c.link.as_str()).collect();
    content_fingerprint(&links.join("\n"))
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|_| CrawlError::InvalidSelector(css.to_string()))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Number of listing pages advertised by the pagination control; 1 if absent.
pub fn parse_page_count(html: &str) -> Result<usize> {
    let document = Html::parse_document(html);
    let pagination = selector(selectors::PAGINATION)?;
    let labels = document.select(&pagination).map(element_text);
    Ok(highest_page_number(labels).unwrap_or(1))
}

/// Partner links on one listing page, in page order without repeats.
pub fn parse_candidates(html: &str, page_url: &str) -> Result<Vec<Candidate>> {
    let document = Html::parse_document(html);
    let links = selector(selectors::LINK)?;
    let tile_name = selector(selectors::TILE_NAME)?;
    let base = Url::parse(page_url).map_err(|err| CrawlError::navigation(page_url, err))?;

    let mut candidates: Vec<Candidate> = Vec::new();
    for anchor in document.select(&links) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if !resolved.path().contains(PARTNER_LINK_PATTERN) {
            continue;
        }
        let name = anchor
            .select(&tile_name)
            .next()
            .map(element_text)
            .unwrap_or_else(|| element_text(anchor));
        let candidate = Candidate::new(name, resolved.as_str());
        if !candidates.iter().any(|seen| seen.link == candidate.link) {
            candidates.push(candidate);
        }
    }
    Ok(candidates)
}

/// Builds a record from a partner detail page.
pub fn parse_detail(html: &str, candidate: &Candidate, fields: &FieldSet) -> Result<PartnerRecord> {
    let document = Html::parse_document(html);
    let name = selector(selectors::NAME)
        .ok()
        .and_then(|name| document.select(&name).next().map(element_text))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| NO_NAME.to_string());

    let mut record = PartnerRecord::new(candidate.link.as_str(), name);
    for field in fields {
        let value = read_field(&document, *field);
        record
            .attributes
            .insert(field.key().to_string(), field_or_sentinel(*field, value));
    }
    record.scraped_at = Some(Utc::now());
    Ok(record)
}

fn read_field(document: &Html, field: Field) -> Result<AttributeValue> {
    let (css, list) = match field {
        Field::Tagline => (selectors::TAGLINE, false),
        Field::Description => (selectors::DESCRIPTION, false),
        Field::ExtendedDescription => (selectors::EXTENDED_DESCRIPTION, false),
        Field::Expertise => (selectors::EXPERTISE, true),
        Field::Industries => (selectors::INDUSTRIES, true),
        Field::Services => (selectors::SERVICES, true),
        Field::Countries => (selectors::COUNTRIES, true),
    };
    let found: Vec<String> = document
        .select(&selector(css)?)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect();
    if found.is_empty() {
        return Err(CrawlError::ElementNotFound(css.to_string()));
    }
    Ok(if list {
        AttributeValue::List(found)
    } else {
        AttributeValue::Text(found.join("\n\n"))
    })
}

#[async_trait]
impl<F: PageFetcher> SiteAdapter for ShopifyDirectory<F> {
    fn name(&self) -> String {
        "shopify".to_string()
    }

    async fn discover(&self) -> Result<Vec<CrawlTask>> {
        let url = self.page_url(1);
        let body = self
            .fetcher
            .fetch_text(&url)
            .await
            .map_err(|err| CrawlError::discovery("pagination", err))?;
        let count = parse_page_count(&body)?;
        self.remember_first_page(&parse_candidates(&body, &url)?);
        tracing::info!(num_pages = count, "listing pages discovered");
        Ok(page_tasks(count, None))
    }

    async fn crawl_round(&self, task: &CrawlTask) -> Result<Vec<Candidate>> {
        let CrawlTask::Page { index } = *task else {
            return Err(CrawlError::unsupported_task(self.name(), task));
        };
        let url = self.page_url(index);
        let body = self.fetcher.fetch_text(&url).await?;
        let candidates = parse_candidates(&body, &url)?;
        if index > 1 && !candidates.is_empty() && self.repeats_first_page(&candidates) {
            tracing::debug!(page = index, "page repeats page 1, treating as end of results");
            return Ok(Vec::new());
        }
        Ok(candidates)
    }

    async fn extract_detail(&self, candidate: &Candidate, fields: &FieldSet) -> Result<PartnerRecord> {
        let body = self.fetcher.fetch_text(&candidate.link).await?;
        parse_detail(&body, candidate, fields)
    }
}
