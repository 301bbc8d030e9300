//! Webhook delivery of announcements.
//!
//! One message per event, no batching, so every announcement stays
//! attributable and retries stay per-event. The destination's rate limit is
//! global, so callers deliver sequentially.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

use crate::retry::{RetryPolicy, Retryable, retry_async};
use crate::shutdown::Shutdown;
use crate::types::{MarketEvent, Provider};
use crate::{KALSHI_COLOR, POLYMARKET_COLOR};

/// Discord embed field caps.
const TITLE_MAX_CHARS: usize = 256;
const DESCRIPTION_MAX_CHARS: usize = 2048;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook returned {status}")]
    Status {
        status: StatusCode,
        retry_after: Option<Duration>,
    },

    #[error("delivery retries exhausted: {0}")]
    Exhausted(Box<DeliveryError>),
}

impl Retryable for DeliveryError {
    fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Request(_) => true,
            DeliveryError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            DeliveryError::Exhausted(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            DeliveryError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Announcement sink the engine hands new events to, one at a time.
#[async_trait]
pub trait Notifier: Send {
    async fn deliver(&mut self, event: &MarketEvent) -> Result<(), DeliveryError>;
}

/// Discord webhook notifier.
pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: String,
    username: String,
    avatar_url: String,
    policy: RetryPolicy,
    min_spacing: Duration,
    shutdown: Shutdown,
    last_post: Option<tokio::time::Instant>,
}

impl DiscordNotifier {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: reqwest::Client,
        webhook_url: String,
        username: String,
        avatar_url: String,
        policy: RetryPolicy,
        min_spacing: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            client,
            webhook_url,
            username,
            avatar_url,
            policy,
            min_spacing,
            shutdown,
            last_post: None,
        }
    }

    /// Space posts out so we stay under the webhook's requests-per-minute
    /// ceiling regardless of how many events a tick produced.
    async fn respect_rate_limit(&mut self) {
        if let Some(last) = self.last_post {
            let elapsed = last.elapsed();
            if elapsed < self.min_spacing {
                tokio::time::sleep(self.min_spacing - elapsed).await;
            }
        }
        self.last_post = Some(tokio::time::Instant::now());
    }

    async fn post(&self, payload: &Value) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // Discord's 429 body carries a retry_after hint in seconds
        let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
            response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| retry_after_hint(&body))
        } else {
            None
        };
        Err(DeliveryError::Status {
            status,
            retry_after,
        })
    }

    /// One-shot startup announcement; failures are the caller's to log.
    pub async fn post_startup(
        &mut self,
        poll_interval_secs: u64,
        providers: &[Provider],
    ) -> Result<(), DeliveryError> {
        self.respect_rate_limit().await;
        let payload = json!({
            "username": self.username,
            "avatar_url": self.avatar_url,
            "embeds": [{
                "title": "Market Events Bot Started",
                "description": "Now monitoring prediction markets for new events.",
                "color": 0x5865F2,
                "fields": [
                    {
                        "name": "Poll Interval",
                        "value": format!("{} minutes", poll_interval_secs / 60),
                        "inline": true,
                    },
                    {
                        "name": "Sources",
                        "value": providers
                            .iter()
                            .map(|p| p.display_name())
                            .collect::<Vec<_>>()
                            .join("\n"),
                        "inline": true,
                    },
                ],
            }],
        });
        self.post(&payload).await
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(&mut self, event: &MarketEvent) -> Result<(), DeliveryError> {
        let payload = json!({
            "username": self.username,
            "avatar_url": self.avatar_url,
            "embeds": [build_embed(event)],
        });

        self.respect_rate_limit().await;
        let policy = self.policy.clone();
        let shutdown = self.shutdown.clone();
        let result =
            retry_async(&policy, &shutdown, "webhook post", || self.post(&payload)).await;

        match result {
            Ok(()) => {
                info!("Posted event: {}", truncate_chars(&event.title, 50));
                Ok(())
            }
            Err(err) if err.is_transient() => Err(DeliveryError::Exhausted(Box::new(err))),
            Err(err) => Err(err),
        }
    }
}

/// Extract the `retry_after` hint (seconds) from a 429 body. Values a
/// `Duration` cannot represent (negative, non-finite, overflowing) are
/// discarded so a hostile or buggy response can't crash the process.
fn retry_after_hint(body: &Value) -> Option<Duration> {
    body.get("retry_after")
        .and_then(Value::as_f64)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn provider_color(provider: Provider) -> u32 {
    match provider {
        Provider::Polymarket => POLYMARKET_COLOR,
        Provider::Kalshi => KALSHI_COLOR,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Format one event as a Discord embed.
fn build_embed(event: &MarketEvent) -> Value {
    let mut embed = json!({
        "title": truncate_chars(&event.title, TITLE_MAX_CHARS),
        "color": provider_color(event.provider),
        "fields": [
            {
                "name": "Source",
                "value": event.provider.display_name(),
                "inline": true,
            },
            {
                "name": "Category",
                "value": event.category.as_deref().unwrap_or("Unknown"),
                "inline": true,
            },
        ],
        "footer": { "text": format!("New {} Event", event.provider.display_name()) },
    });

    if let Some(map) = embed.as_object_mut() {
        if !event.url.is_empty() {
            map.insert("url".to_string(), json!(event.url));
        }
        if !event.description.is_empty() {
            map.insert(
                "description".to_string(),
                json!(truncate_chars(&event.description, DESCRIPTION_MAX_CHARS)),
            );
        }
        if let Some(created_at) = event.created_at {
            map.insert("timestamp".to_string(), json!(created_at.to_rfc3339()));
        }
    }

    embed
}
