use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

pub const RAWG_API_BASE: &str = "https://api.rawg.io/api/games";
pub const DEFAULT_OUTPUT_PATH: &str = "games_dto.json";
pub const DEFAULT_START_PAGE: u32 = 51;
/// RAWG rejects page sizes above 40.
pub const MAX_PAGE_SIZE: u32 = 40;

/// Normalized game record handed to downstream consumers.
///
/// Every field is always serialized: absent upstream values become `null`
/// (or an empty list), never a missing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDto {
    pub id: Option<i64>,
    pub external_api_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub release_date: Option<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// One page of the RAWG `/games` listing.
///
/// Items stay untyped; the transformer decides how to read them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawgPage {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub results: Vec<Value>,
}

impl RawgPage {
    pub fn has_next(&self) -> bool {
        self.next.as_deref().is_some_and(|n| !n.is_empty())
    }
}

/// Harvester configuration
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub api_key: String,
    pub base_url: String,
    pub output_path: PathBuf,
    pub page_size: u32,
    /// Write a full snapshot after every N pages fetched in this run.
    pub checkpoint_interval: u32,
    pub request_delay: Duration,
    pub start_page: u32,
    pub request_timeout: Duration,
    /// Flush unsaved records once when the catalog is exhausted.
    pub flush_on_done: bool,
    /// Flush unsaved records when the run is cancelled or aborted.
    pub flush_on_stop: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: RAWG_API_BASE.to_string(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            page_size: MAX_PAGE_SIZE,
            checkpoint_interval: 5,
            request_delay: Duration::from_secs(1),
            start_page: DEFAULT_START_PAGE,
            request_timeout: Duration::from_secs(30),
            flush_on_done: true,
            flush_on_stop: false,
        }
    }
}

impl HarvestConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let defaults = Self::default();

        let api_key = std::env::var("RAWG_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            bail!("RAWG_API_KEY is not set");
        }

        let base_url = std::env::var("RAWG_BASE_URL").unwrap_or(defaults.base_url);

        let output_path = std::env::var("HARVEST_OUTPUT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_path);

        let page_size = env_parse("HARVEST_PAGE_SIZE", defaults.page_size)?.clamp(1, MAX_PAGE_SIZE);

        let checkpoint_interval =
            env_parse("HARVEST_CHECKPOINT_INTERVAL", defaults.checkpoint_interval)?.max(1);

        let request_delay = Duration::from_millis(env_parse(
            "HARVEST_REQUEST_DELAY_MS",
            defaults.request_delay.as_millis() as u64,
        )?);

        let start_page = env_parse("HARVEST_START_PAGE", defaults.start_page)?.max(1);

        let request_timeout = Duration::from_secs(env_parse(
            "HARVEST_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        )?);

        let flush_on_done = env_flag("HARVEST_FLUSH_ON_DONE", defaults.flush_on_done);
        let flush_on_stop = env_flag("HARVEST_FLUSH_ON_STOP", defaults.flush_on_stop);

        Ok(Self {
            api_key: api_key.trim().to_string(),
            base_url,
            output_path,
            page_size,
            checkpoint_interval,
            request_delay,
            start_page,
            request_timeout,
            flush_on_done,
            flush_on_stop,
        })
    }
}

fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid {}: {:?}", name, raw)),
        _ => Ok(default),
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "on" | "ON" | "yes"))
        .unwrap_or(default)
}
