//! A library for crawling vendor partner directories through the trait
//! `SiteAdapter`, merging partners found under several filters into one
//! record each.

pub mod adapter;
pub mod aggregator;
pub mod browser;
pub mod config;
pub mod crawler;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod limiter;
pub mod pool;
pub mod record;
pub mod retry;
pub mod session;
pub mod sink;
pub mod sites;
pub mod task;

pub use adapter::SiteAdapter;
pub use config::CrawlConfig;
pub use crawler::{run as run_crawl, run_session, Crawler};
pub use error::{CrawlError, Result};
pub use record::{AttributeValue, Field, FieldSet, FoundIn, PartnerRecord};
pub use session::CrawlSession;
pub use task::{Candidate, CrawlTask};
