//! RAWG REST API Client
//!
//! Fetches pages of the `/games` listing. Owns the retry policy for
//! throttling and flaky connections; credential failures are returned
//! immediately so the harvester can abort.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{CatalogSource, FetchError};
use crate::models::{HarvestConfig, RawgPage};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;

#[derive(Clone)]
pub struct RawgRestClient {
    client: Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl RawgRestClient {
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("rawg-harvest/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to build RawgRestClient")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_size: config.page_size,
        })
    }

    /// Fetch one page, retrying 429s and connect/timeout failures.
    pub async fn get_games_page(&self, page: u32) -> Result<RawgPage, FetchError> {
        let mut backoff = INITIAL_BACKOFF_MS;

        for attempt in 1..=MAX_RETRIES {
            let wait = match self.try_get_games_page(page).await {
                Ok(parsed) => return Ok(parsed),
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Retry { error, retry_after }) => {
                    if attempt == MAX_RETRIES {
                        return Err(FetchError::Transport(error));
                    }
                    warn!(
                        page,
                        attempt,
                        error = %format!("{:#}", error),
                        "RAWG request failed, retrying"
                    );
                    retry_delay(retry_after, backoff)
                }
            };

            debug!("Retrying in {}ms", wait.as_millis());
            sleep(wait).await;
            backoff = (backoff * 2).min(MAX_BACKOFF_MS);
        }

        Err(FetchError::Transport(anyhow!(
            "Max retries exceeded for page {}",
            page
        )))
    }

    async fn try_get_games_page(&self, page: u32) -> Result<RawgPage, Attempt> {
        let qp = [
            ("key", self.api_key.clone()),
            ("page_size", self.page_size.to_string()),
            ("page", page.to_string()),
        ];

        // The key is a query parameter; strip URLs from errors so it never reaches the logs.
        let resp = match self.client.get(&self.base_url).query(&qp).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() || e.is_connect() => {
                return Err(Attempt::Retry {
                    error: anyhow::Error::new(e.without_url())
                        .context(format!("GET /games page={} failed", page)),
                    retry_after: None,
                })
            }
            Err(e) => {
                return Err(Attempt::Fatal(FetchError::Transport(
                    anyhow::Error::new(e.without_url())
                        .context(format!("GET /games page={} failed", page)),
                )))
            }
        };

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            let text = resp.text().await.unwrap_or_default();
            return Err(Attempt::Fatal(FetchError::Unauthorized(format!(
                "RAWG rejected the API key ({}): {} - check RAWG_API_KEY",
                status,
                text.trim()
            ))));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(Attempt::Retry {
                error: anyhow!("GET /games page={} {}", page, status),
                retry_after,
            });
        }

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Attempt::Fatal(FetchError::Transport(anyhow!(
                "GET /games page={} {}: {}",
                page,
                status,
                text
            ))));
        }

        resp.json::<RawgPage>()
            .await
            .map_err(|e| {
                Attempt::Fatal(FetchError::Transport(
                    anyhow::Error::new(e.without_url()).context("Failed to parse games response"),
                ))
            })
    }
}

/// Server-supplied `Retry-After` wins, but never beyond the backoff cap.
fn retry_delay(retry_after: Option<Duration>, backoff_ms: u64) -> Duration {
    let cap = Duration::from_millis(MAX_BACKOFF_MS);
    retry_after
        .unwrap_or(Duration::from_millis(backoff_ms))
        .min(cap)
}

enum Attempt {
    Retry {
        error: anyhow::Error,
        retry_after: Option<Duration>,
    },
    Fatal(FetchError),
}

#[async_trait::async_trait]
impl CatalogSource for RawgRestClient {
    async fn fetch_page(&self, page: u32) -> Result<RawgPage, FetchError> {
        self.get_games_page(page).await
    }
}
