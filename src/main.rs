//! harvest - resumable RAWG catalog fetcher
//!
//! Usage:
//!   harvest --start-page 51
//!
//! Environment Variables:
//!   RAWG_API_KEY              - RAWG API key (required)
//!   HARVEST_OUTPUT_PATH       - Checkpoint file (default: games_dto.json)
//!   HARVEST_START_PAGE        - First page to fetch (default: 51)
//!   HARVEST_CHECKPOINT_INTERVAL, HARVEST_PAGE_SIZE, HARVEST_REQUEST_DELAY_MS,
//!   HARVEST_FLUSH_ON_DONE, HARVEST_FLUSH_ON_STOP
//!   RUST_LOG                  - Log filter, same as --log-level
//!
//! A first Ctrl-C stops the run at the next safe point; a second one exits
//! immediately with code 130.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rawg_harvest::{HarvestConfig, HarvestOutcome, HarvestReport, Harvester, RawgRestClient};

const DEFAULT_LOG_FILTER: &str = "rawg_harvest=info,harvest=info";

#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(about = "Fetch the RAWG games catalog into a resumable JSON checkpoint")]
struct Args {
    /// Page to start (or resume) from
    #[arg(long, env = "HARVEST_START_PAGE")]
    start_page: Option<u32>,

    /// Checkpoint file to load and overwrite
    #[arg(long, env = "HARVEST_OUTPUT_PATH")]
    output: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error, or full directives)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    let mut config = HarvestConfig::from_env().context("Failed to load configuration")?;
    if let Some(page) = args.start_page {
        config.start_page = page.max(1);
    }
    if let Some(output) = args.output {
        config.output_path = output;
    }

    info!(
        start_page = config.start_page,
        page_size = config.page_size,
        checkpoint_interval = config.checkpoint_interval,
        "🚀 Resuming RAWG fetch"
    );

    let client = RawgRestClient::new(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut received = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            received += 1;
            match signal_action(received) {
                SignalAction::Shutdown => {
                    info!("Shutdown signal received, press Ctrl-C again to exit now");
                    let _ = shutdown_tx.send(true);
                }
                SignalAction::ForceExit => {
                    warn!("Second shutdown signal, exiting without a checkpoint");
                    std::process::exit(130);
                }
            }
        }
    });

    let report = match Harvester::new(client, config)
        .with_shutdown(shutdown_rx)
        .run()
        .await
    {
        Ok(report) => report,
        Err(e) => {
            error!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    print_summary(&report);
    std::process::exit(report.outcome.exit_code());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    Shutdown,
    ForceExit,
}

fn signal_action(received: u32) -> SignalAction {
    if received <= 1 {
        SignalAction::Shutdown
    } else {
        SignalAction::ForceExit
    }
}

/// `--log-level` (or `RUST_LOG`) when it parses, else the crate default.
fn log_filter(level: Option<&str>) -> EnvFilter {
    level
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .and_then(|l| EnvFilter::try_new(l).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_tracing(level: Option<&str>) {
    tracing_subscriber::registry()
        .with(log_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn summary_title(outcome: &HarvestOutcome) -> &'static str {
    if outcome.is_error() {
        "HARVEST ABORTED"
    } else {
        "HARVEST SUMMARY"
    }
}

fn print_summary(report: &HarvestReport) {
    eprintln!("\n{}", "=".repeat(60));
    eprintln!("{}", summary_title(&report.outcome));
    eprintln!("{}", "=".repeat(60));
    eprintln!("Outcome:            {}", report.outcome);
    eprintln!("Records:            {}", report.records);
    eprintln!("  loaded at start:  {}", report.loaded_records);
    eprintln!("  saved to disk:    {}", report.saved_records);
    eprintln!("Pages fetched:      {}", report.pages_fetched);
    eprintln!(
        "Checkpoints:        {}{}",
        report.checkpoints_written,
        if report.final_flush { " (+ final)" } else { "" }
    );
    if report.outcome.exit_code() != 0 {
        eprintln!("Resume with:        --start-page {}", report.resume_page);
    }
    eprintln!("{}", "=".repeat(60));
}
