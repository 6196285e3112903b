pub mod rawg_rest; // REST client for the RAWG games listing

pub use rawg_rest::RawgRestClient;

use crate::models::RawgPage;

/// Errors a catalog source can report for a single page request
#[derive(Debug)]
pub enum FetchError {
    /// Credentials were rejected. Retrying cannot succeed.
    Unauthorized(String),
    /// Network failure, non-2xx status, or an unreadable body.
    Transport(anyhow::Error),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            Self::Transport(e) => write!(f, "transport error: {:#}", e),
        }
    }
}

impl std::error::Error for FetchError {}

/// A paginated upstream catalog, one page per call.
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<RawgPage, FetchError>;
}
