// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed response cache.
//!
//! The cache is a write-through mirror of the last values this client
//! observed, keyed by logical resource. It is refreshed by successful reads
//! and by successfully synced writes, and is never treated as authoritative
//! over a live remote response.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;

use crate::clock::{ClockSource, SystemClock};
use crate::error::{Error, Result};

/// SQL schema for the response cache.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    last_refreshed INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_refreshed ON cache(last_refreshed);
"#;

/// A cached response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    /// Milliseconds since Unix epoch of the last refresh.
    pub last_refreshed: u64,
}

/// Last-known-good snapshot of read results.
pub struct ResponseCache {
    conn: Mutex<Connection>,
    clock: Box<dyn ClockSource>,
    max_entries: Option<usize>,
}

impl ResponseCache {
    /// Open (or create) a cache database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::from_connection(conn)
    }

    /// Open an in-memory cache.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(ResponseCache {
            conn: Mutex::new(conn),
            clock: Box::new(SystemClock),
            max_entries: None,
        })
    }

    /// Replaces the clock used for `last_refreshed` stamps.
    pub fn with_clock(mut self, clock: impl ClockSource + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Bounds the number of entries. The least recently refreshed entries
    /// are evicted first.
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a cached value.
    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row: Option<(String, i64)> = self
            .conn()
            .query_row(
                "SELECT value, last_refreshed FROM cache WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(value, refreshed)| decode_entry(key.to_string(), &value, refreshed))
            .transpose()
    }

    /// Store a value, replacing any previous entry for the key.
    pub fn put(&self, key: &str, value: &Value) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let now = to_sql_stamp(self.clock.now_ms());
        let conn = self.conn();

        conn.execute(
            "INSERT OR REPLACE INTO cache (key, value, last_refreshed) VALUES (?1, ?2, ?3)",
            params![key, json, now],
        )?;

        if let Some(max) = self.max_entries {
            let keep = i64::try_from(max).unwrap_or(i64::MAX);
            let evicted = conn.execute(
                "DELETE FROM cache WHERE key IN (
                     SELECT key FROM cache
                     ORDER BY last_refreshed DESC, rowid DESC
                     LIMIT -1 OFFSET ?1
                 )",
                params![keep],
            )?;
            if evicted > 0 {
                tracing::debug!(evicted, max, "evicted cache entries");
            }
        }

        Ok(())
    }

    /// Drop a single entry. Returns false if the key was not cached.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM cache WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    /// Drop every entry.
    pub fn clear(&self) -> Result<()> {
        self.conn().execute("DELETE FROM cache", [])?;
        Ok(())
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns all entries, most recently refreshed first.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key, value, last_refreshed FROM cache
             ORDER BY last_refreshed DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, value, refreshed)| decode_entry(key, &value, refreshed))
            .collect()
    }
}

fn to_sql_stamp(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn decode_entry(key: String, value: &str, refreshed: i64) -> Result<CacheEntry> {
    let value = serde_json::from_str(value)
        .map_err(|e| Error::CorruptedData(format!("cache entry '{key}': {e}")))?;
    Ok(CacheEntry {
        key,
        value,
        last_refreshed: u64::try_from(refreshed).unwrap_or(0),
    })
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
