//! Series storage -- append-only, per-entity sample history.
//!
//! Two backends implement [`SeriesStore`]: an in-process [`MemoryStore`] and a
//! SQLite-backed [`SqliteStore`]. Both serialize appends and hand readers an
//! owned snapshot, so a reader never sees a half-written sample.

pub mod memory;
pub mod schema;
pub mod sqlite;

use crate::sampler::Sample;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool unavailable: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored timestamp {value:?} is not RFC 3339: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Append-only store of samples keyed by entity.
///
/// No deduplication or ordering checks happen here; callers decide whether a
/// sample belongs at the end of its series.
pub trait SeriesStore: Send + Sync {
    /// Add `sample` to the end of its entity's series.
    fn append(&self, sample: &Sample) -> Result<(), StoreError>;

    /// Full history for `entity_key` in append order. Empty if never sampled.
    fn read_all(&self, entity_key: &str) -> Result<Vec<Sample>, StoreError>;

    /// Entity keys with at least one sample, sorted.
    fn entities(&self) -> Result<Vec<String>, StoreError>;

    /// Timestamp of the most recently appended sample for `entity_key`.
    fn last_timestamp(&self, entity_key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.read_all(entity_key)?.last().map(|s| s.timestamp))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn).context("failed to migrate database schema")?;

    Ok(pool)
}
