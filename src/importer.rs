//! Uploads harvested games to the application backend
//!
//! One POST per record, sequentially, with a short pause between requests.
//! A rejected record is logged and skipped; the batch always runs to the end.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::models::GameDto;

pub const DEFAULT_IMPORT_URL: &str = "http://localhost:8080/api/games";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub total: usize,
    pub succeeded: usize,
    /// `(title or external id, reason)` for every record that failed.
    pub failures: Vec<(String, String)>,
}

impl ImportSummary {
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

#[derive(Clone)]
pub struct GameImporter {
    client: Client,
    api_url: String,
    delay: Duration,
}

impl GameImporter {
    pub fn new(api_url: impl Into<String>, delay: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build GameImporter client")?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            delay,
        })
    }

    pub async fn post_game(&self, game: &GameDto) -> Result<()> {
        let resp = self
            .client
            .post(&self.api_url)
            .json(game)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.api_url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("POST {} {}: {}", self.api_url, status, text));
        }

        Ok(())
    }

    pub async fn import_all(&self, games: &[GameDto]) -> ImportSummary {
        let mut summary = ImportSummary {
            total: games.len(),
            ..ImportSummary::default()
        };

        for (i, game) in games.iter().enumerate() {
            let label = display_label(game);
            match self.post_game(game).await {
                Ok(()) => {
                    summary.succeeded += 1;
                    info!(game = %label, "Added game");
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!(game = %label, error = %reason, "Failed to add game");
                    summary.failures.push((label, reason));
                }
            }

            if i + 1 < games.len() && !self.delay.is_zero() {
                sleep(self.delay).await;
            }
        }

        info!(
            succeeded = summary.succeeded,
            total = summary.total,
            "Import completed"
        );
        summary
    }
}

fn display_label(game: &GameDto) -> String {
    game.title
        .clone()
        .unwrap_or_else(|| game.external_api_id.clone())
}
