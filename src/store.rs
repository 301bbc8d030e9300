//! Durable seen-event store.
//!
//! The store owns all persisted dedup state: one record per `(provider, id)`
//! key, created the moment an event is first classified as new and never
//! updated afterwards. The engine is the only writer.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, params};
use thiserror::Error;
use tracing::info;

use crate::types::{MarketEvent, Provider};

/// Store failures are fatal to the current tick (dedup correctness cannot be
/// assumed without the store) but never to the process.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Seen-market counts for operator logs.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: u64,
    pub by_provider: BTreeMap<String, u64>,
}

/// Contract for the dedup store. An explicit handle is passed to the engine
/// so tests can substitute [`MemorySeenStore`].
pub trait SeenStore {
    fn exists(&self, provider: Provider, id: &str) -> Result<bool, StoreError>;

    /// Record an event key with its first-seen timestamp. Idempotent: a
    /// second call for the same key is a no-op, never an error, so a crash
    /// between marking and delivering cannot wedge the store.
    fn record(&mut self, event: &MarketEvent, first_seen_at: DateTime<Utc>)
    -> Result<(), StoreError>;

    /// Delete records first seen strictly before `cutoff`. Returns the
    /// number removed. A record exactly at the cutoff survives.
    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Delete records older than `older_than`, measured from now.
    fn prune(&mut self, older_than: Duration) -> Result<u64, StoreError> {
        self.prune_before(Utc::now() - older_than)
    }

    /// Records held for one provider. Zero means this provider has never
    /// completed a sync (the initial-sync signal).
    fn count(&self, provider: Provider) -> Result<u64, StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// SQLite-backed store, one row per seen market.
pub struct SqliteSeenStore {
    conn: Connection,
}

impl SqliteSeenStore {
    /// Open (or create) the database at `path`, creating parent directories
    /// as needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        info!("Database initialized at {}", path.display());
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS seen_markets (
                id TEXT NOT NULL,
                source TEXT NOT NULL,
                title TEXT,
                url TEXT,
                category TEXT,
                first_seen_at TEXT NOT NULL,
                PRIMARY KEY (id, source)
            )",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_first_seen_at
             ON seen_markets (first_seen_at)",
            [],
        )?;
        Ok(())
    }
}

impl SeenStore for SqliteSeenStore {
    fn exists(&self, provider: Provider, id: &str) -> Result<bool, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM seen_markets WHERE id = ?1 AND source = ?2")?;
        Ok(stmt.exists(params![id, provider.as_str()])?)
    }

    fn record(
        &mut self,
        event: &MarketEvent,
        first_seen_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO seen_markets
             (id, source, title, url, category, first_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id,
                event.provider.as_str(),
                event.title,
                event.url,
                event.category,
                first_seen_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        // RFC 3339 strings in UTC compare lexicographically in time order
        let removed = self.conn.execute(
            "DELETE FROM seen_markets WHERE first_seen_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(removed as u64)
    }

    fn count(&self, provider: Provider) -> Result<u64, StoreError> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM seen_markets WHERE source = ?1",
            params![provider.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let total: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM seen_markets", [], |row| row.get(0))?;
        let mut stmt = self
            .conn
            .prepare("SELECT source, COUNT(*) FROM seen_markets GROUP BY source")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?;
        let mut by_provider = BTreeMap::new();
        for row in rows {
            let (source, count) = row?;
            by_provider.insert(source, count);
        }
        Ok(StoreStats { total, by_provider })
    }
}

/// In-memory store with the same contract; test double and throwaway runs.
#[derive(Default)]
pub struct MemorySeenStore {
    records: BTreeMap<(Provider, String), DateTime<Utc>>,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeenStore for MemorySeenStore {
    fn exists(&self, provider: Provider, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.contains_key(&(provider, id.to_string())))
    }

    fn record(
        &mut self,
        event: &MarketEvent,
        first_seen_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.records
            .entry((event.provider, event.id.clone()))
            .or_insert(first_seen_at);
        Ok(())
    }

    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, first_seen| *first_seen >= cutoff);
        Ok((before - self.records.len()) as u64)
    }

    fn count(&self, provider: Provider) -> Result<u64, StoreError> {
        Ok(self.records.keys().filter(|(p, _)| *p == provider).count() as u64)
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut by_provider = BTreeMap::new();
        for (provider, _) in self.records.keys() {
            *by_provider.entry(provider.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(StoreStats {
            total: self.records.len() as u64,
            by_provider,
        })
    }
}
