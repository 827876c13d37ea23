use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use partner_crawler::{
    crawler,
    fetch::HttpFetcher,
    sink::{read_records, JsonFileSink, ResultSink},
    sites::{shopify::LISTING_URL, ShopifyDirectory},
    CrawlConfig, CrawlSession, Field,
};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Crawl the Shopify partner directory and write the partners as JSON.
#[derive(Debug, Parser)]
#[command(name = "shopify-crawl", version)]
struct Cli {
    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON crawl configuration.
    #[arg(short, long, env = "PARTNER_CRAWL_CONFIG")]
    config: Option<PathBuf>,

    /// Listing page to start from.
    #[arg(long, default_value = LISTING_URL)]
    listing_url: String,

    /// Crawl at most this many listing pages.
    #[arg(long)]
    max_pages: Option<usize>,

    /// Field to scrape from detail pages; repeat for several.
    #[arg(short, long = "field")]
    fields: Vec<Field>,

    /// Only a couple of rounds and candidates.
    #[arg(long)]
    testing: bool,

    /// Keep the partners already in the output file and skip refetching them.
    #[arg(long, requires = "output")]
    resume: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new("info"))
                .expect("telemetry: Creating EnvFilter"),
        )
        .init();

    if let Err(err) = run(cli).await {
        tracing::error!("shopify crawl failed: {}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> partner_crawler::Result<()> {
    let mut config = match &cli.config {
        Some(path) => CrawlConfig::from_json_file(path)?,
        None => CrawlConfig::default(),
    };
    if cli.max_pages.is_some() {
        config.max_pages = cli.max_pages;
    }
    if !cli.fields.is_empty() {
        config = config.with_fields(cli.fields.iter().copied());
    }
    config.testing_mode |= cli.testing;

    let fetcher = HttpFetcher::new(config.navigation_timeout())?;
    let directory = Arc::new(ShopifyDirectory::new(fetcher).with_listing_url(cli.listing_url));

    let session = match (&cli.output, cli.resume) {
        (Some(path), true) => CrawlSession::resume(config, read_records(path)),
        _ => CrawlSession::new(config),
    };
    let records = crawler::run_session(directory, Arc::new(session), crawler::ctrl_c()).await?;

    JsonFileSink::new(cli.output).write_records(&records).await
}
