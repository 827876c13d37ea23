use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::canonical_key;

/// Discovery-context section recorded for partners found on listing pages.
pub const LISTING_SECTION: &str = "Listing Page";

/// One unit of outer crawl work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CrawlTask {
    Filter { section: String, value: String },
    Page { index: usize },
}

impl CrawlTask {
    pub fn filter<S: Into<String>, V: Into<String>>(section: S, value: V) -> Self {
        Self::Filter {
            section: section.into(),
            value: value.into(),
        }
    }

    pub fn page(index: usize) -> Self {
        Self::Page { index }
    }

    /// The `(section, value)` tag recorded on partners found by this task.
    pub fn tag(&self) -> (String, String) {
        match self {
            Self::Filter { section, value } => (section.clone(), value.clone()),
            Self::Page { index } => (LISTING_SECTION.to_string(), index.to_string()),
        }
    }
}

impl fmt::Display for CrawlTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter { section, value } => write!(f, "filter '{section}' = '{value}'"),
            Self::Page { index } => write!(f, "page {index}"),
        }
    }
}

/// A partner link found in a round's results, not yet extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub link: String,
}

impl Candidate {
    pub fn new<N: Into<String>>(name: N, link: &str) -> Self {
        Self {
            name: name.into().trim().to_string(),
            link: canonical_key(link),
        }
    }
}
