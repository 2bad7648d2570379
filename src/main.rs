//! # ESG News Scraper
//!
//! Collects ESG-related news articles about named companies, for a given
//! year, from a fixed set of news sources (Vedomosti, Kommersant, Forbes)
//! and merges everything into a single tab-separated dataset for downstream
//! analysis.
//!
//! ## Architecture
//!
//! The pipeline is a concurrent scraping orchestrator:
//! 1. **Requests**: read the flat request table and expand each company/year
//!    row into one request per source
//! 2. **Scheduling**: run each active request as an isolated task on a
//!    bounded worker pool (3 workers by default)
//! 3. **Scraping**: each task resolves its source parser, discovers and
//!    extracts articles through a rate-limit aware retry layer, and appends
//!    records to its own intermediate store
//! 4. **Merging**: combine all intermediate stores into one deduplicated
//!    artifact and report which (company, year, source) combinations failed
//!
//! ## Usage
//!
//! ```sh
//! esg_news_scraper -r data/request.csv -o data
//! ```

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod errors;
mod fetch;
mod merge;
mod models;
mod requests;
mod scheduler;
mod sources;
mod store;
mod utils;

use cli::Cli;
use fetch::RetryPolicy;
use models::TaskState;
use scheduler::Scheduler;
use store::RunDir;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("esg_news_scraper starting up");

    let args = Cli::parse();
    let output_dir = Path::new(&args.output_dir);

    // Early check: fail before any network traffic if we cannot write.
    if let Err(e) = ensure_writable_dir(output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    // ---- Read and expand requests ----
    let request_list = requests::read_requests(Path::new(&args.request_file)).await?;
    let active = request_list.iter().filter(|r| r.active).count();
    info!(
        total = request_list.len(),
        active,
        "Request table expanded"
    );

    let run_dir = RunDir::create(output_dir).await?;

    // ---- Shutdown wiring: Ctrl-C stops dispatch, in-flight tasks abandon
    // between fetches ----
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Shutdown requested; letting in-flight tasks wind down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!(error = %e, "Unable to listen for shutdown signal"),
        }
    });

    // ---- Run all tasks to a terminal state ----
    let scheduler = Scheduler {
        max_workers: args.max_workers,
        retry_policy: RetryPolicy {
            max_attempts: args.max_attempts,
            base_delay: std::time::Duration::from_millis(args.backoff_base_ms),
            ..RetryPolicy::default()
        },
    };
    let outcomes = scheduler.run(request_list, &run_dir, shutdown_rx).await;

    for outcome in &outcomes {
        match outcome.state {
            TaskState::Succeeded => info!(
                task_id = outcome.task_id,
                company = %outcome.company,
                source = %outcome.source,
                records = outcome.records_written,
                "Task finished"
            ),
            _ => warn!(
                task_id = outcome.task_id,
                company = %outcome.company,
                source = %outcome.source,
                records = outcome.records_written,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Task did not finish cleanly"
            ),
        }
    }

    // ---- Merge intermediate stores into the final artifact ----
    // An error here is fatal: no artifact beats a silently incomplete one.
    let summary = merge::merge(&run_dir, &outcomes).await?;

    for failure in &summary.failures {
        warn!(
            company = %failure.company,
            year = failure.year,
            source = %failure.source,
            reason = %failure.error,
            "Coverage gap; re-run this combination"
        );
    }
    for (source, count) in &summary.per_source {
        info!(source = %source, records = count, "Source record count");
    }

    let elapsed = start_time.elapsed();
    info!(
        artifact = %summary.artifact_path.display(),
        records = summary.records_merged,
        duplicates_dropped = summary.duplicates_dropped,
        succeeded = summary.tasks_succeeded,
        failed = summary.tasks_failed,
        secs = elapsed.as_secs(),
        "Execution complete"
    );
    println!("{}", summary.artifact_path.display());

    Ok(())
}
