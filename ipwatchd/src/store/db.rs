use std::path::Path;
use anyhow::{bail, Context, Result};
use rusqlite::{Connection, params, OptionalExtension};
use shared::types::{AvailableRange, Entry};
use uuid::Uuid;

const ENTRY_COLUMNS: &str = "id, timestamp, ip, changed_after, last_updated";

pub struct EntryDb {
    conn: Connection,
}

impl EntryDb {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id            TEXT PRIMARY KEY,
                timestamp     INTEGER NOT NULL,
                ip            TEXT NOT NULL,
                changed_after INTEGER NOT NULL DEFAULT 0,
                last_updated  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_timestamp ON entries(timestamp);
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// The entry with the greatest timestamp, if any
    pub fn latest(&self) -> Result<Option<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries ORDER BY timestamp DESC LIMIT 1"
        );
        let entry = self
            .conn
            .query_row(&sql, [], Self::row_to_entry)
            .optional()
            .context("Failed to query latest entry")?;

        Ok(entry)
    }

    /// Persist a new entry under a fresh id
    pub fn create(
        &self,
        ip: &str,
        timestamp: i64,
        last_updated: i64,
        changed_after: i64,
    ) -> Result<Entry> {
        let entry = Entry {
            id: Uuid::new_v4(),
            timestamp,
            ip: ip.to_string(),
            changed_after,
            last_updated,
        };

        self.conn.execute(
            "INSERT INTO entries (id, timestamp, ip, changed_after, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.id.to_string(),
                entry.timestamp,
                &entry.ip,
                entry.changed_after,
                entry.last_updated,
            ],
        )
        .context("Failed to insert entry")?;

        Ok(entry)
    }

    /// Move `last_updated` forward to `timestamp`. An older timestamp leaves it as is.
    pub fn touch(&self, id: Uuid, timestamp: i64) -> Result<Entry> {
        let updated = self.conn.execute(
            "UPDATE entries SET last_updated = MAX(last_updated, ?1) WHERE id = ?2",
            params![timestamp, id.to_string()],
        )
        .context("Failed to update entry")?;

        if updated == 0 {
            bail!("Entry {} does not exist", id);
        }

        self.get_entry(id)?
            .with_context(|| format!("Entry {} vanished after update", id))
    }

    pub fn get_entry(&self, id: Uuid) -> Result<Option<Entry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1");
        let entry = self
            .conn
            .query_row(&sql, params![id.to_string()], Self::row_to_entry)
            .optional()
            .context("Failed to query entry")?;

        Ok(entry)
    }

    pub fn min_timestamp(&self) -> Result<Option<i64>> {
        self.conn
            .query_row("SELECT MIN(timestamp) FROM entries", [], |row| row.get(0))
            .context("Failed to query earliest timestamp")
    }

    pub fn max_timestamp(&self) -> Result<Option<i64>> {
        self.conn
            .query_row("SELECT MAX(timestamp) FROM entries", [], |row| row.get(0))
            .context("Failed to query latest timestamp")
    }

    /// Extrema of all stored timestamps; both `None` when empty
    pub fn available_range(&self) -> Result<AvailableRange> {
        Ok(AvailableRange {
            from: self.min_timestamp()?,
            to: self.max_timestamp()?,
        })
    }

    /// Entries with `from <= timestamp <= to`, oldest first. A missing bound is open.
    pub fn find_in_range(&self, from: Option<i64>, to: Option<i64>) -> Result<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries
             WHERE (?1 IS NULL OR timestamp >= ?1)
               AND (?2 IS NULL OR timestamp <= ?2)
             ORDER BY timestamp ASC"
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare query")?;

        let entries = stmt
            .query_map(params![from, to], Self::row_to_entry)
            .context("Failed to query entries")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect entries")?;

        Ok(entries)
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .context("Failed to count entries")?;

        Ok(count as u64)
    }

    fn row_to_entry(row: &rusqlite::Row) -> Result<Entry, rusqlite::Error> {
        let id_str: String = row.get(0)?;
        let id = Uuid::parse_str(&id_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?;

        Ok(Entry {
            id,
            timestamp: row.get(1)?,
            ip: row.get(2)?,
            changed_after: row.get(3)?,
            last_updated: row.get(4)?,
        })
    }
}
