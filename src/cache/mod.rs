//! SQLite-backed result cache with time-based expiry.
//!
//! Storage: a single `job_cache` table (`key`, `data`, `timestamp`) in
//! `<gateway_home>/cache.db` by default.
//!
//! Entries older than the freshness window are treated as absent on read
//! but are never deleted; the next write to the same key replaces them.
//! The schema is created by an explicit [`CacheStore::init`] call.

pub mod key;

pub use key::{derive_key, KEY_LEN};

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use thiserror::Error;

/// Default freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// The cache could not be read or written.
///
/// Callers that use the cache purely as an optimisation treat this as a
/// miss and fall through to the uncached path.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("cache unavailable: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache unavailable: corrupt entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Time source in epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock [`Clock`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// SQLite-backed cache store.
pub struct CacheStore {
    conn: Mutex<Connection>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Open (or create) the database file at `db_path`.
    ///
    /// Does not touch the schema; call [`init`](Self::init) before use.
    pub fn open_path(db_path: &Path, ttl: Duration) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        tracing::debug!(path = %db_path.display(), ttl_secs = ttl.as_secs(), "cache database opened");
        Ok(Self::from_connection(conn, ttl))
    }

    /// Open a private in-memory database (useful for tests).
    pub fn open_in_memory(ttl: Duration) -> Result<Self, CacheError> {
        Ok(Self::from_connection(Connection::open_in_memory()?, ttl))
    }

    fn from_connection(conn: Connection, ttl: Duration) -> Self {
        Self {
            conn: Mutex::new(conn),
            ttl,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create the cache table if it does not exist.  Idempotent; never
    /// touches existing rows.
    pub fn init(&self) -> Result<(), CacheError> {
        self.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS job_cache (
                key       TEXT PRIMARY KEY,
                data      TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Return the value stored under `key` if it is still fresh.
    pub fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let row: Option<(String, i64)> = self
            .lock()
            .query_row(
                "SELECT data, timestamp FROM job_cache WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((data, written_at)) = row else {
            return Ok(None);
        };
        let age = self.clock.now().saturating_sub(written_at);
        if age >= self.ttl.as_secs() as i64 {
            tracing::trace!(key, age, "cache entry stale");
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Insert or replace the entry for `key`, stamped with the current time.
    pub fn put(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        let data = serde_json::to_string(value)?;
        let now = self.clock.now();
        self.lock().execute(
            "INSERT OR REPLACE INTO job_cache (key, data, timestamp) VALUES (?1, ?2, ?3)",
            params![key, data, now],
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").field("ttl", &self.ttl).finish()
    }
}
