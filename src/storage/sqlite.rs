use super::{open_pool, Pool, SeriesStore, StoreError};
use crate::sampler::Sample;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::path::Path;

/// Durable series store. Append order is the rowid order.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Opening sample database");
        Ok(Self::new(open_pool(path)?))
    }

    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn get_pool(&self) -> &Pool {
        &self.pool
    }
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| StoreError::Timestamp { value, source })
}

impl SeriesStore for SqliteStore {
    fn append(&self, sample: &Sample) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO samples (entity_key, timestamp, value) VALUES (?1, ?2, ?3)",
            params![sample.entity_key, sample.timestamp.to_rfc3339(), sample.value],
        )?;
        Ok(())
    }

    fn read_all(&self, entity_key: &str) -> Result<Vec<Sample>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, value FROM samples
             WHERE entity_key = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![entity_key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut series = Vec::new();
        for r in rows {
            let (timestamp, value) = r?;
            series.push(Sample::new(entity_key, parse_timestamp(timestamp)?, value));
        }
        Ok(series)
    }

    fn entities(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT entity_key FROM samples ORDER BY entity_key ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for r in rows {
            keys.push(r?);
        }
        Ok(keys)
    }

    fn last_timestamp(&self, entity_key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp FROM samples WHERE entity_key = ?1 ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![entity_key], |row| row.get::<_, String>(0))?;

        match rows.next() {
            Some(r) => Ok(Some(parse_timestamp(r?)?)),
            None => Ok(None),
        }
    }
}
