//! # Headline Harvest
//!
//! Discovers the news articles linked from an arbitrary homepage and stores
//! each one with a single representative lead image.
//!
//! ## Usage
//!
//! ```sh
//! headline_harvest https://news.example.com -o ./articles_output
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Discovery**: classify homepage links, fetch candidate pages
//!    concurrently and verify which of them are articles
//! 2. **Harvesting**: propose image candidates through up to three
//!    score-gated strategies
//! 3. **Selection**: dedupe, rank and size-check the candidates
//! 4. **Materialization**: download the winner and store it as JPEG
//! 5. **Output**: one folder per article plus a JSON run summary

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod extractors;
mod http;
mod images;
mod links;
mod models;
mod outputs;
mod pipeline;
mod utils;
mod verifier;

use cli::Cli;
use config::Config;
use http::{Fetcher, HttpFetcher, RetryFetcher};
use models::PipelineRun;
use outputs::json;
use pipeline::Pipeline;
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
    info!("headline_harvest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(url = %args.url, output = %args.output.display(), "Parsed CLI arguments");

    // ---- Load config ----
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    info!(
        max_articles = config.run.max_articles,
        concurrency = config.run.concurrency,
        "Run settings"
    );

    // Early check: ensure output dir is writable
    if let Err(e) = ensure_writable_dir(&args.output).await {
        error!(
            path = %args.output.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let fetcher: Arc<dyn Fetcher> = Arc::new(RetryFetcher::new(HttpFetcher::new(&config.http)?, &config.http));

    // ---- Cooperative stop on Ctrl-C, hard exit on the second ----
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if watch_interrupts(tokio::signal::ctrl_c, &stop).await {
                error!("Second interrupt received; exiting without waiting for the current article");
                std::process::exit(130);
            }
        });
    }

    // ---- Run ----
    let pipeline = Pipeline::new(config, fetcher, args.output.clone(), stop);
    let mut run = PipelineRun::new(&args.url);
    let result = pipeline.run(&args.url, &mut run).await;

    let summary_path = args.summary_path();
    if let Err(e) = json::write_summary(&summary_path, &run).await {
        error!(path = %summary_path.display(), error = %e, "Failed to write run summary");
    }

    info!(
        homepage = %run.homepage_url,
        links = run.links.succeeded,
        discovered = run.discovered(),
        image_completed = run.image_completed(),
        success_rate = %format!("{:.1}%", run.success_rate),
        throughput = %format!("{:.2}/s", run.throughput),
        cancelled = run.cancelled,
        "Run summary"
    );

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    if let Err(e) = result {
        error!(error = %e, "Run failed");
        return Err(e.into());
    }
    Ok(())
}

/// Wait for interrupts from `next_signal`. The first one raises `stop`; the
/// return value says whether a second one arrived after it.
async fn watch_interrupts<F, Fut>(mut next_signal: F, stop: &AtomicBool) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        warn!(error = %e, "Cannot listen for interrupts");
        return false;
    }
    warn!("Interrupt received; finishing the current article and stopping (Ctrl-C again to quit now)");
    stop.store(true, Ordering::SeqCst);
    next_signal().await.is_ok()
}
