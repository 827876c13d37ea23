//! Detail extraction for one candidate. A key has at most one fetch in flight and is never fetched once stored.

use std::sync::atomic::Ordering;

use chrono::Utc;

use crate::{
    adapter::SiteAdapter,
    aggregator::Claim,
    error::Result,
    record::{AttributeValue, Field, FieldSet, PartnerRecord},
    session::CrawlSession,
    task::Candidate,
};

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// Already known; only the discovery context changed.
    Tagged,
    /// Fetched and stored as a new record.
    Stored,
    /// Fetch failed; nothing was stored.
    Dropped,
    Cancelled,
}

pub struct DetailExtractor<'a> {
    adapter: &'a dyn SiteAdapter,
    session: &'a CrawlSession,
}

impl<'a> DetailExtractor<'a> {
    pub fn new(adapter: &'a dyn SiteAdapter, session: &'a CrawlSession) -> Self {
        Self { adapter, session }
    }

    pub async fn extract(&self, candidate: &Candidate, section: &str, value: &str) -> Extraction {
        let stats = &self.session.statistics;
        let reservation = loop {
            match self.session.aggregator.claim(&candidate.link, section, value) {
                Claim::Tagged => {
                    stats.num_tagged.fetch_add(1, Ordering::SeqCst);
                    tracing::debug!(link = candidate.link, section, value, "tagged known partner");
                    return Extraction::Tagged;
                }
                Claim::Reserved(reservation) => break reservation,
                // The other fetch may fail, in which case this round takes over.
                Claim::InFlight(fetch) => fetch.settled().await,
            }
        };

        if self.session.is_cancelled() {
            return Extraction::Cancelled;
        }

        stats.num_detail_fetches.fetch_add(1, Ordering::SeqCst);
        let fields = &self.session.config.fields_to_scrape;
        match self.adapter.extract_detail(candidate, fields).await {
            Ok(record) => {
                reservation.commit(finish_record(record, candidate, fields));
                tracing::debug!(link = candidate.link, "stored partner");
                Extraction::Stored
            }
            Err(err) => {
                stats.num_detail_errors.fetch_add(1, Ordering::SeqCst);
                if err.is_fatal() {
                    self.session.abort(err);
                } else {
                    tracing::warn!(link = candidate.link, "dropping partner: {}", err);
                }
                Extraction::Dropped
            }
        }
    }
}

/// Fills the name from the candidate when the detail page had none and gives
/// every requested field a value.
fn finish_record(mut record: PartnerRecord, candidate: &Candidate, fields: &FieldSet) -> PartnerRecord {
    if record.name == crate::record::NO_NAME && !candidate.name.is_empty() {
        record.name = candidate.name.clone();
    }
    for field in fields {
        record
            .attributes
            .entry(field.key().to_string())
            .or_insert_with(|| field.sentinel());
    }
    record.scraped_at.get_or_insert_with(Utc::now);
    record
}

/// The extracted value, or the field's sentinel if extraction failed.
pub fn field_or_sentinel(field: Field, value: Result<AttributeValue>) -> AttributeValue {
    match value {
        Ok(AttributeValue::Text(text)) if text.trim().is_empty() => field.sentinel(),
        Ok(AttributeValue::List(items)) if items.is_empty() => field.sentinel(),
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(field = %field, "field unavailable: {}", err);
            field.sentinel()
        }
    }
}
