use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use market_events_bot::config::{Config, PRUNE_AFTER_DAYS};
use market_events_bot::engine::run_tick;
use market_events_bot::notifier::DiscordNotifier;
use market_events_bot::shutdown::Shutdown;
use market_events_bot::sources::{EventSource, KalshiSource, PolymarketSource};
use market_events_bot::store::{SeenStore, SqliteSeenStore};

#[derive(Parser)]
#[command(name = "market-events", about = "Prediction market announcement bot")]
struct Args {
    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // --- Starting: config, store, collaborators ---
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    info!(
        "Starting market-events bot — poll={}s db={}",
        config.poll_interval_secs,
        config.database_path.display(),
    );

    let mut store =
        SqliteSeenStore::open(&config.database_path).context("failed to open seen-events store")?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;

    let sources: Vec<Box<dyn EventSource>> = vec![
        Box::new(PolymarketSource::new(
            client.clone(),
            config.polymarket_api_url.clone(),
        )),
        Box::new(KalshiSource::new(
            client.clone(),
            config.kalshi_api_url.clone(),
        )),
    ];
    let providers: Vec<_> = sources.iter().map(|s| s.provider()).collect();

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    let policy = config.retry.policy();
    let mut notifier = DiscordNotifier::new(
        client,
        config.webhook_url.clone(),
        config.bot_username.clone(),
        config.bot_avatar_url.clone(),
        policy.clone(),
        config.webhook_min_spacing,
        shutdown.clone(),
    );

    if let Err(e) = notifier
        .post_startup(config.poll_interval_secs, &providers)
        .await
    {
        warn!("Failed to post startup message: {e}");
    }

    // --- Running: strictly serialized ticks ---
    let poll_interval = config.poll_interval();
    let prune_every = config.prune_every_ticks();
    let mut tick_count: u64 = 0;

    info!(
        "Entering polling loop (interval: {}s). Press Ctrl+C to stop.",
        config.poll_interval_secs
    );

    loop {
        if shutdown.is_triggered() {
            break;
        }
        let started = tokio::time::Instant::now();

        match run_tick(&sources, &mut store, &mut notifier, &policy, &shutdown).await {
            Ok(summary) => {
                info!(
                    "Tick complete: fetched={} new={} delivered={} undelivered={} skipped_providers={}",
                    summary.fetched,
                    summary.new_events,
                    summary.delivered,
                    summary.undelivered,
                    summary.skipped_providers,
                );
                if summary.initial_syncs > 0 {
                    match store.stats() {
                        Ok(stats) => info!(
                            "Initial sync complete. Seen markets: {} total, {:?}",
                            stats.total, stats.by_provider
                        ),
                        Err(e) => warn!("Failed to read store stats: {e}"),
                    }
                }
            }
            // The tick is lost but the process lives on; next interval retries
            Err(e) => warn!("Tick aborted by store error: {e}"),
        }

        tick_count += 1;
        if tick_count % prune_every == 0 {
            match store.prune(chrono::Duration::days(PRUNE_AFTER_DAYS)) {
                Ok(removed) if removed > 0 => {
                    info!("Pruned {removed} old seen-market entries");
                }
                Ok(_) => {}
                Err(e) => warn!("Prune failed (will retry next cycle): {e}"),
            }
        }

        if args.once {
            break;
        }

        // Overrunning ticks start the next one immediately, never concurrently
        let wait = poll_interval.saturating_sub(started.elapsed());
        if wait.is_zero() {
            continue;
        }
        if !shutdown.sleep(wait).await {
            break;
        }
    }

    // --- Stopped: connection closes on drop; exit code 0 ---
    info!("Shutdown complete");
    Ok(())
}

/// Trigger the shutdown flag on SIGINT or SIGTERM. The tick in progress
/// finishes its current provider before the loop observes the flag.
fn spawn_signal_listener(shutdown: Shutdown) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = term.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = ctrl_c.await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("Shutdown signal received");
        shutdown.trigger();
    });
}
