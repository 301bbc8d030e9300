pub mod config;
pub mod engine;
pub mod notifier;
pub mod retry;
pub mod shutdown;
pub mod sources;
pub mod store;
pub mod types;

/// Polymarket Gamma API events endpoint (public, no auth required)
pub const POLYMARKET_API_URL: &str = "https://gamma-api.polymarket.com/events";

/// Kalshi trade API events endpoint (public, no auth required)
pub const KALSHI_API_URL: &str = "https://api.elections.kalshi.com/trade-api/v2/events";

/// Embed accent color for Polymarket announcements (purple)
pub const POLYMARKET_COLOR: u32 = 0x7C3AED;

/// Embed accent color for Kalshi announcements (green)
pub const KALSHI_COLOR: u32 = 0x10B981;
