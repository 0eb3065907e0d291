//! Persistent override store backed by SQLite.
//!
//! One row per overridden key, last-write-wins. The database file lives on
//! durable storage so overrides survive process restarts. The resolver is
//! the only reader and writer.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite-backed key/value store for runtime configuration overrides.
pub struct OverrideStore {
    conn: Mutex<Connection>,
}

impl OverrideStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open settings database: {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory store, used by tests and the dry-run CLI paths.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory settings")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create settings table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fetch one override, if present.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("settings store poisoned");
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read setting '{key}'"))?;
        Ok(value)
    }

    /// Insert or replace an override. Last write wins.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().expect("settings store poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .with_context(|| format!("Failed to store setting '{key}'"))?;
        Ok(())
    }

    /// Delete one override. Returns whether a row existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("settings store poisoned");
        let deleted = conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .with_context(|| format!("Failed to delete setting '{key}'"))?;
        Ok(deleted > 0)
    }

    /// Delete every override. Returns the number of rows removed.
    pub fn clear_all(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("settings store poisoned");
        let deleted = conn
            .execute("DELETE FROM settings", [])
            .context("Failed to clear settings")?;
        Ok(deleted)
    }

    /// All overrides as (key, value) pairs, sorted by key.
    pub fn list_all(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock().expect("settings store poisoned");
        let mut stmt = conn
            .prepare("SELECT key, value FROM settings ORDER BY key")
            .context("Failed to list settings")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .context("Failed to list settings")?;

        let mut all = Vec::new();
        for row in rows {
            all.push(row.context("Failed to read settings row")?);
        }
        Ok(all)
    }
}
