//! Kalshi trade API adapter.
//!
//! Pages through `GET /trade-api/v2/events` with cursor pagination until the
//! API stops returning a cursor (or returns an empty page).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{EventSource, FetchError, PAGE_LIMIT, get_json};
use crate::types::{MarketEvent, Provider};

pub struct KalshiSource {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    events: Vec<KalshiEvent>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KalshiEvent {
    #[serde(default)]
    event_ticker: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    sub_title: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

impl KalshiSource {
    pub fn new(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }
}

#[async_trait]
impl EventSource for KalshiSource {
    fn provider(&self) -> Provider {
        Provider::Kalshi
    }

    async fn fetch(&self) -> Result<Vec<MarketEvent>, FetchError> {
        let mut events = Vec::new();
        let mut cursor: Option<String> = None;
        let fetched_at = Utc::now();

        loop {
            let mut query = vec![("limit", PAGE_LIMIT.to_string())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }
            let page: EventsPage =
                get_json(&self.client, self.provider(), &self.api_url, &query).await?;

            let page_empty = page.events.is_empty();
            for item in page.events {
                match parse_event(item, fetched_at) {
                    Some(event) => events.push(event),
                    None => warn!("Skipping Kalshi event with no ticker"),
                }
            }

            cursor = page.cursor.filter(|c| !c.is_empty());
            if cursor.is_none() || page_empty {
                break;
            }
        }

        debug!("Fetched {} events from Kalshi", events.len());
        Ok(events)
    }
}

/// Normalize one Kalshi record. The event ticker is the identity; records
/// without one are dropped. Title and subtitle are joined for display.
fn parse_event(item: KalshiEvent, fetched_at: DateTime<Utc>) -> Option<MarketEvent> {
    let ticker = item.event_ticker.filter(|t| !t.is_empty())?;

    let mut title = item.title.unwrap_or_else(|| "Unknown".to_string());
    if let Some(subtitle) = item.sub_title.filter(|s| !s.is_empty()) {
        title = format!("{title} - {subtitle}");
    }

    Some(MarketEvent {
        url: format!("https://kalshi.com/markets/{ticker}"),
        id: ticker,
        provider: Provider::Kalshi,
        title,
        // The list endpoint carries no description
        description: String::new(),
        category: item.category.filter(|c| !c.is_empty()),
        created_at: None,
        fetched_at,
    })
}
