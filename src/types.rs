use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Market providers the bot monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Polymarket,
    Kalshi,
}

impl Provider {
    /// Lowercase form used as the store key namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Polymarket => "polymarket",
            Provider::Kalshi => "kalshi",
        }
    }

    /// Capitalized form for display in announcements.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Polymarket => "Polymarket",
            Provider::Kalshi => "Kalshi",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized market event from any provider.
///
/// Identity is `(provider, id)`; all other fields are display metadata and
/// never affect dedup (a title edit does not re-announce an event).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEvent {
    pub id: String,
    pub provider: Provider,
    pub title: String,
    pub description: String,
    pub url: String,
    pub category: Option<String>,
    /// When the provider listed the event, if reported.
    pub created_at: Option<DateTime<Utc>>,
    /// When this process retrieved the event. Orders events within a tick;
    /// never persisted.
    pub fetched_at: DateTime<Utc>,
}
