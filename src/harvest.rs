//! Resumable page harvester
//!
//! Walks the catalog one page at a time from a caller-chosen start page,
//! transforms every record, and writes the whole accumulator to the
//! checkpoint file every `checkpoint_interval` pages. A run ends when the
//! catalog is exhausted, the user cancels, or a fetch fails.
//!
//! Cancelled and failed runs do not write a final snapshot unless
//! `flush_on_stop` is set: records fetched since the last periodic checkpoint
//! are dropped, and the next run resumes from `HarvestReport::resume_page`.
//!
//! A completed run writes one extra snapshot on top of the periodic ones
//! when `flush_on_done` is set, which is the default. With an interval of 5
//! a 13-page run therefore writes three times: after pages 5 and 10, then a
//! final flush. Only the two periodic writes count in
//! `HarvestReport::checkpoints_written`; the last one sets `final_flush`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::models::{GameDto, HarvestConfig};
use crate::scrapers::{CatalogSource, FetchError};
use crate::transform::to_dto;

/// Why a harvest run stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// Empty page or no `next` link.
    EndOfData,
    /// Stop requested by the user.
    Cancelled,
    /// Credentials rejected by the upstream API.
    FatalAuth(String),
    /// Network failure or unexpected response.
    TransportError(String),
    /// The snapshot could not be written; the previous one is intact.
    CheckpointFailed(String),
}

impl HarvestOutcome {
    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::EndOfData => 0,
            Self::Cancelled => 130,
            Self::FatalAuth(_) => 2,
            Self::TransportError(_) | Self::CheckpointFailed(_) => 1,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::FatalAuth(_) | Self::TransportError(_) | Self::CheckpointFailed(_)
        )
    }
}

impl std::fmt::Display for HarvestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfData => write!(f, "finished: exhausted data"),
            Self::Cancelled => write!(f, "stopped: user request"),
            Self::FatalAuth(msg) => write!(f, "aborted: fatal credential error: {}", msg),
            Self::TransportError(msg) => write!(f, "aborted: transport error: {}", msg),
            Self::CheckpointFailed(msg) => write!(f, "aborted: checkpoint write failed: {}", msg),
        }
    }
}

/// Summary of one harvest run
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub outcome: HarvestOutcome,
    /// Records held in memory when the run stopped, including prior runs.
    pub records: usize,
    /// Records loaded from the checkpoint at startup.
    pub loaded_records: usize,
    /// Records persisted in the checkpoint file when the run stopped.
    pub saved_records: usize,
    pub pages_fetched: u32,
    /// Periodic checkpoints only; the final flush is tracked separately.
    pub checkpoints_written: u32,
    pub final_flush: bool,
    pub last_page: Option<u32>,
    /// First page whose records are not in the checkpoint file.
    pub resume_page: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HarvestReport {
    pub fn unsaved_records(&self) -> usize {
        self.records.saturating_sub(self.saved_records)
    }
}

pub struct Harvester<S> {
    source: S,
    store: CheckpointStore,
    config: HarvestConfig,
    shutdown: watch::Receiver<bool>,
}

impl<S: CatalogSource> Harvester<S> {
    pub fn new(source: S, config: HarvestConfig) -> Self {
        let store = CheckpointStore::new(config.output_path.clone());
        // Sender dropped immediately: never cancelled.
        let (_tx, shutdown) = watch::channel(false);
        Self {
            source,
            store,
            config,
            shutdown,
        }
    }

    /// Stop the run when `true` is sent on the channel.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Run until the catalog is exhausted, the user stops, or a fetch fails.
    ///
    /// Only a failure to load the existing checkpoint is returned as `Err`;
    /// every other ending is described by the report's outcome.
    pub async fn run(self) -> Result<HarvestReport> {
        let Self {
            source,
            store,
            config,
            mut shutdown,
        } = self;

        let started_at = Utc::now();
        let interval = config.checkpoint_interval.max(1);

        let mut games: Vec<GameDto> = store.load()?;
        let loaded_records = games.len();
        let mut saved_records = loaded_records;

        let mut page = config.start_page;
        let mut pages_fetched = 0u32;
        let mut checkpoints_written = 0u32;
        let mut last_page: Option<u32> = None;
        let mut resume_page = config.start_page;

        info!(
            start_page = page,
            records = loaded_records,
            output = %store.path().display(),
            "🚀 Starting RAWG harvest"
        );

        let mut outcome = loop {
            if *shutdown.borrow() {
                break HarvestOutcome::Cancelled;
            }

            info!(page, "Fetching page");
            let fetched = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break HarvestOutcome::Cancelled,
                result = source.fetch_page(page) => result,
            };

            let data = match fetched {
                Ok(data) => data,
                Err(FetchError::Unauthorized(msg)) => break HarvestOutcome::FatalAuth(msg),
                Err(FetchError::Transport(e)) => {
                    break HarvestOutcome::TransportError(format!("{:#}", e))
                }
            };

            if data.results.is_empty() {
                info!(page, "✅ No more games available");
                break HarvestOutcome::EndOfData;
            }

            games.extend(data.results.iter().map(to_dto));
            pages_fetched += 1;
            last_page = Some(page);

            if pages_fetched % interval == 0 {
                if let Err(e) = store.save(&games) {
                    break HarvestOutcome::CheckpointFailed(format!("{:#}", e));
                }
                checkpoints_written += 1;
                saved_records = games.len();
                resume_page = page + 1;
                info!(
                    page,
                    records = games.len(),
                    resume_page,
                    "💾 Progress saved"
                );
            }

            if !data.has_next() {
                info!(page, "✅ Finished all available pages");
                break HarvestOutcome::EndOfData;
            }

            page += 1;

            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break HarvestOutcome::Cancelled,
                _ = sleep(config.request_delay) => {}
            }
        };

        let mut final_flush = false;
        let wants_flush = match outcome {
            HarvestOutcome::EndOfData => config.flush_on_done,
            HarvestOutcome::CheckpointFailed(_) => false,
            _ => config.flush_on_stop,
        };

        if wants_flush && games.len() > saved_records {
            match store.save(&games) {
                Ok(()) => {
                    final_flush = true;
                    saved_records = games.len();
                    if let Some(p) = last_page {
                        resume_page = p + 1;
                    }
                    info!(records = games.len(), "💾 Final snapshot saved");
                }
                Err(e) => {
                    let msg = format!("{:#}", e);
                    error!(error = %msg, "final snapshot failed");
                    if outcome == HarvestOutcome::EndOfData {
                        outcome = HarvestOutcome::CheckpointFailed(msg);
                    }
                }
            }
        }

        let report = HarvestReport {
            outcome,
            records: games.len(),
            loaded_records,
            saved_records,
            pages_fetched,
            checkpoints_written,
            final_flush,
            last_page,
            resume_page,
            started_at,
            finished_at: Utc::now(),
        };

        log_report(&report);
        Ok(report)
    }
}

/// Resolves once `true` is published. A closed channel never resolves.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn log_report(report: &HarvestReport) {
    let elapsed = (report.finished_at - report.started_at).num_seconds();
    match &report.outcome {
        HarvestOutcome::EndOfData => info!(
            records = report.records,
            pages = report.pages_fetched,
            checkpoints = report.checkpoints_written,
            elapsed_secs = elapsed,
            "✅ {}",
            report.outcome
        ),
        HarvestOutcome::Cancelled => warn!(
            records = report.records,
            unsaved = report.unsaved_records(),
            resume_page = report.resume_page,
            "🛑 {}",
            report.outcome
        ),
        _ => error!(
            records = report.records,
            unsaved = report.unsaved_records(),
            resume_page = report.resume_page,
            "❌ {}",
            report.outcome
        ),
    }
}
