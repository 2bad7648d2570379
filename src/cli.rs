//! Command-line interface definitions.
//!
//! This module defines the CLI arguments using the `clap` crate. Argument
//! handling is deliberately thin: it only wires paths and pool/retry knobs
//! into the core, which owns all behavior.

use clap::Parser;

/// Command-line arguments for the ESG news scraper.
///
/// # Examples
///
/// ```sh
/// # Scrape everything listed in data/request.csv into data/parse_run_…
/// esg_news_scraper -r data/request.csv -o data
///
/// # Gentler on rate-limited sources
/// esg_news_scraper -r data/request.csv -o data --max-workers 2 --backoff-base-ms 2000
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the request table (company,year,active,source-type rows)
    #[arg(short, long, env = "ESG_REQUEST_FILE", default_value = "data/request.csv")]
    pub request_file: String,

    /// Directory under which the timestamped run directory is created
    #[arg(short, long, env = "ESG_OUTPUT_DIR", default_value = "data")]
    pub output_dir: String,

    /// Number of parallel scraping workers
    #[arg(long, default_value_t = 3)]
    pub max_workers: usize,

    /// Attempt ceiling per fetch before a task-level failure
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// Baseline backoff delay in milliseconds (doubles per penalty level)
    #[arg(long, default_value_t = 1000)]
    pub backoff_base_ms: u64,
}
