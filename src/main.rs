//! Shelf-Scout main entry point
//!
//! This is the command-line interface for the Shelf-Scout grocery product crawler.

use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use shelf_scout::config::{load_config_with_hash, Config};
use shelf_scout::crawler::{BatchSummary, Coordinator};
use shelf_scout::output::{load_statistics, print_statistics};
use shelf_scout::renderer::{ChromiumBrowser, SessionFactory};
use shelf_scout::storage::{open_repository, ProductField, SharedRepository};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// What a batch does
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Walk category menus and record product URLs
    Discover,
    /// Add product URLs listed in a file
    Seed,
    /// Scrape due product URLs
    Scrape,
    /// Print freshness and failure statistics
    Stats,
    /// Re-derive a missing product field from stored payloads
    Backfill,
}

/// Shelf-Scout: a browser-driven grocery product crawler
///
/// Shelf-Scout discovers product pages on grocery sites by walking their category
/// menus in Chrome, scrapes the structured product data embedded in each page, and
/// keeps per-URL freshness so repeated runs only revisit what has gone stale.
#[derive(Parser, Debug)]
#[command(name = "shelf-scout")]
#[command(version)]
#[command(about = "A browser-driven grocery product crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Batch mode
    #[arg(long, value_enum, default_value_t = Mode::Scrape)]
    mode: Mode,

    /// Seller to work on, or "all"
    #[arg(long, default_value = "all")]
    seller: String,

    /// Scrape at most this many URLs
    #[arg(long)]
    limit: Option<usize>,

    /// Stop discovery after this many iterations per seller (0 = until interrupted)
    #[arg(long)]
    max_iterations: Option<u64>,

    /// File of product URLs to seed, one per line
    #[arg(long, value_name = "FILE", required_if_eq("mode", "seed"))]
    urls: Option<PathBuf>,

    /// Product field to backfill: gtin, rating, description, image or categories
    #[arg(long, required_if_eq("mode", "backfill"))]
    missing: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(max) = cli.max_iterations {
        config.discovery.max_iterations = max;
    }

    let seller = match cli.seller.as_str() {
        "all" => None,
        name => Some(name),
    };

    match cli.mode {
        Mode::Stats => handle_stats(&config)?,
        Mode::Seed => {
            let urls = cli.urls.as_deref().unwrap_or(Path::new(""));
            handle_seed(config, config_hash, urls)?
        }
        Mode::Backfill => {
            let missing = cli.missing.as_deref().unwrap_or_default();
            handle_backfill(config, config_hash, missing, seller)?
        }
        Mode::Discover | Mode::Scrape => {
            handle_browser_batch(config, config_hash, cli.mode, seller, cli.limit).await?
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelf_scout=info,warn"),
            1 => EnvFilter::new("shelf_scout=debug,info"),
            2 => EnvFilter::new("shelf_scout=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_shared_repository(config: &Config) -> anyhow::Result<SharedRepository> {
    let path = Path::new(&config.output.database_path);
    let repo = open_repository(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(Mutex::new(repo)))
}

/// Trips the returned token on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing the current step");
            trip.cancel();
        }
    });
    cancel
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "\nRun #{} {}: {} processed, {} succeeded, {} failed, {} discovered",
        summary.run_id,
        summary.status.to_db_string(),
        summary.counters.processed,
        summary.counters.succeeded,
        summary.counters.failed,
        summary.counters.discovered
    );
}

/// Handles the stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let repo = open_repository(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&repo, config.scrape.freshness_days, Utc::now())?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the seed mode
fn handle_seed(config: Config, config_hash: String, urls: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(urls)
        .with_context(|| format!("Failed to read URL list {}", urls.display()))?;

    let repo = open_shared_repository(&config)?;
    let coordinator = Coordinator::new(config, config_hash, repo, cancel_on_ctrl_c())?;
    let summary = coordinator.run_seed(content.lines())?;

    print_summary(&summary);
    Ok(())
}

/// Handles the backfill mode
fn handle_backfill(
    config: Config,
    config_hash: String,
    missing: &str,
    seller: Option<&str>,
) -> anyhow::Result<()> {
    let field = ProductField::from_name(missing)
        .ok_or_else(|| anyhow!("Cannot backfill field '{}'", missing))?;

    let repo = open_shared_repository(&config)?;
    let coordinator = Coordinator::new(config, config_hash, repo, cancel_on_ctrl_c())?;
    let (summary, report) = coordinator.run_backfill(field, seller)?;

    println!(
        "Backfilled {} of {} products missing {}",
        report.filled,
        report.examined,
        field.column()
    );
    print_summary(&summary);
    Ok(())
}

/// Handles the discover and scrape modes, which need a browser
async fn handle_browser_batch(
    config: Config,
    config_hash: String,
    mode: Mode,
    seller: Option<&str>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let repo = open_shared_repository(&config)?;
    let browser = Arc::new(
        ChromiumBrowser::launch(&config.browser)
            .await
            .context("Failed to launch Chrome")?,
    );
    let coordinator = Coordinator::new(config, config_hash, repo, cancel_on_ctrl_c())?;

    let result = match mode {
        Mode::Discover => coordinator.run_discovery(browser.as_ref(), seller).await,
        _ => {
            let factory: Arc<dyn SessionFactory> = browser.clone();
            coordinator.run_scrape(factory, seller, limit).await
        }
    };

    match Arc::try_unwrap(browser) {
        Ok(browser) => browser.shutdown().await,
        Err(_) => tracing::warn!("Browser still in use, leaving it to exit with the process"),
    }

    let summary = result?;
    print_summary(&summary);
    Ok(())
}
