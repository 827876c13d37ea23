use std::sync::Arc;

use partner_crawler::{
    crawler,
    sink::{JsonFileSink, ResultSink},
    CrawlConfig, Field,
};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    println!("starting fake_directory");
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new("debug"))
                .expect("telemetry: Creating EnvFilter"),
        )
        .init();

    let config = CrawlConfig {
        outer_concurrency: 3,
        inner_concurrency: 4,
        ..CrawlConfig::default()
    }
    .with_fields([Field::Tagline, Field::Countries]);

    let directory = Arc::new(fake_directory::FakeDirectory::new());
    match crawler::run(directory, config, crawler::ctrl_c()).await {
        Ok(records) => {
            if let Err(err) = JsonFileSink::default().write_records(&records).await {
                tracing::error!("failed to write records: {}", err);
            }
        }
        Err(err) => tracing::error!("crawl failed: {}", err),
    }
}

pub mod fake_directory {
    use std::time::Duration;

    use async_trait::async_trait;
    use partner_crawler::{
        AttributeValue, Candidate, CrawlError, CrawlTask, Field, FieldSet, PartnerRecord, Result,
        SiteAdapter,
    };

    const FILTERS: [(&str, &str); 4] = [
        ("Salesforce Expertise", "Commerce"),
        ("Salesforce Expertise", "Service"),
        ("Industry Expertise", "Retail"),
        ("Industry Expertise", "Healthcare"),
    ];

    /// Every filter lists a window of partners overlapping its neighbours.
    #[derive(Debug)]
    pub struct FakeDirectory {}

    impl FakeDirectory {
        pub fn new() -> Self {
            Self {}
        }
    }

    #[async_trait]
    impl SiteAdapter for FakeDirectory {
        fn name(&self) -> String {
            "fake-directory".to_string()
        }

        async fn discover(&self) -> Result<Vec<CrawlTask>> {
            Ok(FILTERS
                .iter()
                .map(|(section, value)| CrawlTask::filter(*section, *value))
                .collect())
        }

        async fn crawl_round(&self, task: &CrawlTask) -> Result<Vec<Candidate>> {
            let position = FILTERS
                .iter()
                .position(|(section, value)| *task == CrawlTask::filter(*section, *value))
                .ok_or_else(|| CrawlError::navigation(task.to_string(), "no such filter"))?;
            println!("crawling {}", task);
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok((position * 3..position * 3 + 5)
                .map(|n| Candidate::new(format!("Partner {n}"), &format!("https://example.com/partner/{n}")))
                .collect())
        }

        async fn extract_detail(&self, candidate: &Candidate, fields: &FieldSet) -> Result<PartnerRecord> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            println!("extracting '{}'", candidate.link);
            let mut record = PartnerRecord::new(candidate.link.as_str(), candidate.name.as_str());
            if fields.contains(&Field::Tagline) {
                record = record.with_attribute(Field::Tagline, format!("{} gets it done", candidate.name));
            }
            if fields.contains(&Field::Countries) {
                record = record.with_attribute(
                    Field::Countries,
                    AttributeValue::List(vec!["Sweden".to_string(), "Norway".to_string()]),
                );
            }
            Ok(record)
        }
    }
}
