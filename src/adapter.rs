use async_trait::async_trait;

use crate::{
    error::Result,
    record::{FieldSet, PartnerRecord},
    task::{Candidate, CrawlTask},
};

/// One vendor directory. The crawler only talks to a site through this
/// trait; selectors, URLs and page handling stay inside the implementation.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn name(&self) -> String;

    /// The rounds to crawl. An error here aborts the run.
    async fn discover(&self) -> Result<Vec<CrawlTask>>;

    /// Candidate partners surfaced by one round. May repeat links seen in
    /// other rounds.
    async fn crawl_round(&self, task: &CrawlTask) -> Result<Vec<Candidate>>;

    /// Fetches one partner's detail page. Individual fields that cannot be
    /// read are filled with their sentinel rather than failing the record.
    async fn extract_detail(
        &self,
        candidate: &Candidate,
        fields: &FieldSet,
    ) -> Result<PartnerRecord>;

    /// Releases adapter-owned resources at the end of a run.
    async fn shutdown(&self) {}
}
