#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use partner_crawler::{
    Candidate, CrawlError, CrawlTask, Field, FieldSet, PartnerRecord, Result, SiteAdapter,
};

/// In-memory directory with scripted rounds, failures and latencies.
#[derive(Default)]
pub struct FakeDirectory {
    tasks: Vec<CrawlTask>,
    results: HashMap<CrawlTask, Vec<Candidate>>,
    /// Failures before a round succeeds; `usize::MAX` never succeeds.
    round_failures: HashMap<CrawlTask, usize>,
    /// Failed fetches before a detail page succeeds; `usize::MAX` never succeeds.
    detail_failures: HashMap<String, usize>,
    unsupported: Vec<CrawlTask>,
    discovery_error: bool,
    pool_exhausted: bool,
    latency: Duration,
    round_attempts: Mutex<HashMap<CrawlTask, usize>>,
    detail_fetches: Mutex<HashMap<String, usize>>,
    rounds_in_flight: AtomicUsize,
    rounds_peak: AtomicUsize,
    details_in_flight: AtomicUsize,
    details_peak: AtomicUsize,
}

pub fn link(id: &str) -> String {
    format!("https://x/{id}")
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(10),
            ..Self::default()
        }
    }

    /// Adds a round whose results are the partners `ids`.
    pub fn round(mut self, task: CrawlTask, ids: &[&str]) -> Self {
        let candidates = ids
            .iter()
            .map(|id| Candidate::new(format!("Partner {id}"), &link(id)))
            .collect();
        self.tasks.push(task.clone());
        self.results.insert(task, candidates);
        self
    }

    pub fn failing_round(mut self, task: CrawlTask, failures: usize) -> Self {
        self.round_failures.insert(task, failures);
        self
    }

    /// Discovers `task` but refuses to crawl it.
    pub fn unsupported_round(mut self, task: CrawlTask) -> Self {
        self.tasks.push(task.clone());
        self.unsupported.push(task);
        self
    }

    pub fn failing_detail(self, id: &str) -> Self {
        self.flaky_detail(id, usize::MAX)
    }

    pub fn flaky_detail(mut self, id: &str, failures: usize) -> Self {
        self.detail_failures.insert(link(id), failures);
        self
    }

    pub fn discovery_error(mut self) -> Self {
        self.discovery_error = true;
        self
    }

    pub fn pool_exhausted(mut self) -> Self {
        self.pool_exhausted = true;
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn round_attempts(&self, task: &CrawlTask) -> usize {
        self.round_attempts
            .lock()
            .unwrap()
            .get(task)
            .copied()
            .unwrap_or(0)
    }

    pub fn fetches_of(&self, id: &str) -> usize {
        self.detail_fetches
            .lock()
            .unwrap()
            .get(&link(id))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.detail_fetches.lock().unwrap().values().sum()
    }

    pub fn rounds_peak(&self) -> usize {
        self.rounds_peak.load(Ordering::SeqCst)
    }

    pub fn details_peak(&self) -> usize {
        self.details_peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SiteAdapter for FakeDirectory {
    fn name(&self) -> String {
        "fake-directory".to_string()
    }

    async fn discover(&self) -> Result<Vec<CrawlTask>> {
        if self.discovery_error {
            return Err(CrawlError::discovery("Salesforce Expertise", "filter section not found"));
        }
        Ok(self.tasks.clone())
    }

    async fn crawl_round(&self, task: &CrawlTask) -> Result<Vec<Candidate>> {
        if self.unsupported.contains(task) {
            return Err(CrawlError::unsupported_task(self.name(), task));
        }
        let _in_flight = InFlight::enter(&self.rounds_in_flight, &self.rounds_peak);
        let attempt = {
            let mut attempts = self.round_attempts.lock().unwrap();
            let count = attempts.entry(task.clone()).or_insert(0);
            *count += 1;
            *count
        };
        tokio::time::sleep(self.latency).await;
        if attempt <= self.round_failures.get(task).copied().unwrap_or(0) {
            return Err(CrawlError::navigation(task.to_string(), "net::ERR_TIMED_OUT"));
        }
        Ok(self.results.get(task).cloned().unwrap_or_default())
    }

    async fn extract_detail(&self, candidate: &Candidate, fields: &FieldSet) -> Result<PartnerRecord> {
        let _in_flight = InFlight::enter(&self.details_in_flight, &self.details_peak);
        let attempt = {
            let mut fetches = self.detail_fetches.lock().unwrap();
            let count = fetches.entry(candidate.link.clone()).or_insert(0);
            *count += 1;
            *count
        };
        tokio::time::sleep(self.latency).await;
        if self.pool_exhausted {
            return Err(CrawlError::PoolExhausted(Duration::from_secs(5)));
        }
        if attempt <= self.detail_failures.get(&candidate.link).copied().unwrap_or(0) {
            return Err(CrawlError::navigation(candidate.link.clone(), "detail page timed out"));
        }
        let mut record = PartnerRecord::new(candidate.link.as_str(), candidate.name.as_str());
        // Only the tagline exists on fake detail pages.
        if fields.contains(&Field::Tagline) {
            record = record.with_attribute(Field::Tagline, format!("Tagline of {}", candidate.name));
        }
        Ok(record)
    }
}
