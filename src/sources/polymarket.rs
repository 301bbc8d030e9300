//! Polymarket Gamma API adapter.
//!
//! Pages through `GET /events?active=true` with offset pagination until a
//! short page signals the end of the listing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{EventSource, FetchError, PAGE_LIMIT, get_json, truncate};
use crate::types::{MarketEvent, Provider};

/// Description text cap; Discord embeds reject anything near provider blobs.
const DESCRIPTION_MAX_CHARS: usize = 500;

pub struct PolymarketSource {
    client: reqwest::Client,
    api_url: String,
}

/// One event record in the Gamma listing payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    creation_date: Option<String>,
}

impl PolymarketSource {
    pub fn new(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }
}

#[async_trait]
impl EventSource for PolymarketSource {
    fn provider(&self) -> Provider {
        Provider::Polymarket
    }

    async fn fetch(&self) -> Result<Vec<MarketEvent>, FetchError> {
        let mut events = Vec::new();
        let mut offset = 0usize;
        let fetched_at = Utc::now();

        loop {
            let query = [
                ("active", "true".to_string()),
                ("limit", PAGE_LIMIT.to_string()),
                ("offset", offset.to_string()),
            ];
            let page: Vec<GammaEvent> =
                get_json(&self.client, self.provider(), &self.api_url, &query).await?;

            if page.is_empty() {
                break;
            }
            let page_len = page.len();

            for item in page {
                match parse_event(item, fetched_at) {
                    Some(event) => events.push(event),
                    None => warn!("Skipping Polymarket event with no id"),
                }
            }

            if page_len < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
        }

        debug!("Fetched {} events from Polymarket", events.len());
        Ok(events)
    }
}

/// Normalize one Gamma record. Records without an id are dropped.
fn parse_event(item: GammaEvent, fetched_at: DateTime<Utc>) -> Option<MarketEvent> {
    let id = item.id.filter(|id| !id.is_empty())?;

    let url = match item.slug.as_deref() {
        Some(slug) if !slug.is_empty() => format!("https://polymarket.com/event/{slug}"),
        _ => String::new(),
    };

    let created_at = item
        .creation_date
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some(MarketEvent {
        id,
        provider: Provider::Polymarket,
        title: item.title.unwrap_or_else(|| "Unknown".to_string()),
        description: truncate(item.description.as_deref().unwrap_or(""), DESCRIPTION_MAX_CHARS),
        url,
        category: item.category.filter(|c| !c.is_empty()),
        created_at,
        fetched_at,
    })
}
