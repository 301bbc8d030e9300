use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::retry::RetryPolicy;
use crate::{KALSHI_API_URL, POLYMARKET_API_URL};

/// Default poll interval in seconds (5 minutes).
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Default on-disk location of the seen-events database.
const DEFAULT_DATABASE_PATH: &str = "data/seen_markets.db";

const DEFAULT_BOT_USERNAME: &str = "Market Events";
const DEFAULT_BOT_AVATAR_URL: &str = "https://i.imgur.com/AfFp7pu.png";

/// Seen records older than this many days are eligible for pruning.
pub const PRUNE_AFTER_DAYS: i64 = 90;

/// Application config sourced from environment variables (`.env` supported).
#[derive(Debug, Clone)]
pub struct Config {
    /// Destination webhook. Required; startup fails without it.
    pub webhook_url: String,
    pub poll_interval_secs: u64,
    pub database_path: PathBuf,
    pub bot_username: String,
    pub bot_avatar_url: String,
    pub polymarket_api_url: String,
    pub kalshi_api_url: String,
    pub retry: RetrySettings,
    /// Minimum spacing between webhook posts. The destination allows
    /// 30 requests per 60s per webhook; 2s spacing keeps us under it.
    pub webhook_min_spacing: Duration,
}

/// Backoff constants shared by the fetch and delivery paths.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: self.base_delay,
            multiplier: self.multiplier,
            max_delay: self.max_delay,
            max_attempts: self.max_attempts,
        }
    }
}

impl Config {
    /// Load config from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let webhook_url = match get("DISCORD_WEBHOOK_URL") {
            Some(url) if !url.is_empty() => url,
            _ => bail!("DISCORD_WEBHOOK_URL environment variable is required"),
        };

        let poll_interval_secs = match get("POLL_INTERVAL_SECONDS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("invalid POLL_INTERVAL_SECONDS: {raw}"))?,
            None => DEFAULT_POLL_INTERVAL_SECS,
        };
        if poll_interval_secs == 0 {
            bail!("POLL_INTERVAL_SECONDS must be positive");
        }

        Ok(Self {
            webhook_url,
            poll_interval_secs,
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            bot_username: get("BOT_USERNAME").unwrap_or_else(|| DEFAULT_BOT_USERNAME.to_string()),
            bot_avatar_url: get("BOT_AVATAR_URL")
                .unwrap_or_else(|| DEFAULT_BOT_AVATAR_URL.to_string()),
            polymarket_api_url: get("POLYMARKET_API_URL")
                .unwrap_or_else(|| POLYMARKET_API_URL.to_string()),
            kalshi_api_url: get("KALSHI_API_URL").unwrap_or_else(|| KALSHI_API_URL.to_string()),
            retry: RetrySettings::default(),
            webhook_min_spacing: Duration::from_secs(2),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Ticks between pruning passes: once per day worth of cycles.
    pub fn prune_every_ticks(&self) -> u64 {
        (86_400 / self.poll_interval_secs).max(1)
    }
}
