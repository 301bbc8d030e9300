//! Reconciliation engine: one tick of the poll → dedup → deliver pipeline.
//!
//! Providers are processed independently and strictly sequentially. Within a
//! provider, every new event is recorded in the store *before* any delivery
//! attempt (mark-before-deliver): announcements are at-most-once, and a crash
//! between marking and delivering drops the announcement rather than ever
//! duplicating it.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{info, warn};

use crate::notifier::Notifier;
use crate::retry::{RetryPolicy, retry_async};
use crate::shutdown::Shutdown;
use crate::sources::EventSource;
use crate::store::{SeenStore, StoreError};
use crate::types::MarketEvent;

/// Per-tick counters for operator logs.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub fetched: usize,
    pub new_events: usize,
    pub delivered: usize,
    pub undelivered: usize,
    pub skipped_providers: usize,
    /// Providers that went through initial sync this tick (recorded, not
    /// announced).
    pub initial_syncs: usize,
}

/// Run one reconciliation tick across all sources.
///
/// Fetch and delivery failures are contained per provider and per event; a
/// [`StoreError`] aborts the tick, since dedup cannot be trusted without the
/// store. The shutdown flag is honored between providers and inside backoff
/// sleeps; an in-progress delivery loop always finishes its provider.
pub async fn run_tick(
    sources: &[Box<dyn EventSource>],
    store: &mut dyn SeenStore,
    notifier: &mut dyn Notifier,
    policy: &RetryPolicy,
    shutdown: &Shutdown,
) -> Result<TickSummary, StoreError> {
    let mut summary = TickSummary::default();

    for source in sources {
        if shutdown.is_triggered() {
            break;
        }
        let provider = source.provider();

        // A provider with no history is syncing for the first time: record
        // everything, announce nothing, so a fresh deployment stays silent.
        let initial_sync = store.count(provider)? == 0;

        let label = format!("{provider} fetch");
        let fetched = match retry_async(policy, shutdown, &label, || source.fetch()).await {
            Ok(events) => events,
            Err(err) => {
                warn!("Skipping {provider} this tick: {err}");
                summary.skipped_providers += 1;
                continue;
            }
        };
        summary.fetched += fetched.len();

        // Partition in adapter order; the provider's ordering is the display
        // ordering. A key repeated within one fetch (offset pagination can
        // shift mid-listing) counts as new only at its first position.
        let mut new_events: Vec<&MarketEvent> = Vec::new();
        let mut tick_seen: HashSet<&str> = HashSet::new();
        for event in &fetched {
            if store.exists(provider, &event.id)? || !tick_seen.insert(&event.id) {
                continue;
            }
            new_events.push(event);
        }
        summary.new_events += new_events.len();

        // Mark before deliver.
        let first_seen_at = Utc::now();
        for event in &new_events {
            store.record(event, first_seen_at)?;
        }

        if initial_sync {
            summary.initial_syncs += 1;
            info!(
                "Initial sync for {provider}: recorded {} events, skipping announcements",
                new_events.len()
            );
            continue;
        }

        if !new_events.is_empty() {
            info!("Found {} new {provider} events", new_events.len());
        }

        for event in new_events {
            match notifier.deliver(event).await {
                Ok(()) => summary.delivered += 1,
                Err(err) => {
                    warn!(
                        "Undelivered {provider} event {} ({}): {err}",
                        event.id, event.title
                    );
                    summary.undelivered += 1;
                }
            }
        }
    }

    Ok(summary)
}
