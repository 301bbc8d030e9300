//! Source adapters: one per market provider.
//!
//! Each adapter translates its provider's wire shape into [`MarketEvent`]s
//! and fetches the full listing (all pages) in one call. Adapters are
//! stateless per call and never retry internally; the engine owns backoff.

pub mod kalshi;
pub mod polymarket;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::retry::Retryable;
use crate::types::{MarketEvent, Provider};

pub use kalshi::KalshiSource;
pub use polymarket::PolymarketSource;

/// Events per page requested from both providers.
pub(crate) const PAGE_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {provider} failed: {source}")]
    Request {
        provider: Provider,
        source: reqwest::Error,
    },

    #[error("{provider} API returned {status}")]
    Status {
        provider: Provider,
        status: StatusCode,
        retry_after: Option<Duration>,
    },

    #[error("malformed {provider} payload: {detail}")]
    Malformed { provider: Provider, detail: String },
}

impl Retryable for FetchError {
    fn is_transient(&self) -> bool {
        match self {
            // Timeouts and connection failures are retryable; anything that
            // got a response goes through the Status variant instead.
            FetchError::Request { .. } => true,
            FetchError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            FetchError::Malformed { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A market provider the reconciliation engine can poll.
///
/// Adding a provider means adding an implementation, not touching the engine.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn provider(&self) -> Provider;

    /// Fetch all currently-listed events, paginating to exhaustion.
    async fn fetch(&self) -> Result<Vec<MarketEvent>, FetchError>;
}

/// GET `url` with `query` and deserialize the JSON body as `T`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    provider: Provider,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, FetchError> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|source| FetchError::Request { provider, source })?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(FetchError::Status {
            provider,
            status,
            retry_after,
        });
    }

    response.json::<T>().await.map_err(|e| FetchError::Malformed {
        provider,
        detail: e.to_string(),
    })
}

/// Truncate to at most `max` characters on a char boundary.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
