//! SQLite-backed append-only event log.
//!
//! One table, `change_events`, holding one row per detected change. Rows are
//! only ever inserted; corrections happen by appending, never by rewriting
//! history. Timestamps are stored as fixed-width RFC 3339 UTC text so that
//! lexicographic comparison in SQL matches chronological order.

use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use ipwatch_core::Error;
use ipwatch_core::traits::{ChangeEvent, EventLog, NewChangeEvent};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS change_events (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    address   TEXT NOT NULL,
    city      TEXT,
    region    TEXT,
    country   TEXT
);
CREATE INDEX IF NOT EXISTS idx_change_events_timestamp ON change_events(timestamp);
CREATE INDEX IF NOT EXISTS idx_change_events_address ON change_events(address);
";

/// Event log persisted in a SQLite database.
pub struct SqliteEventLog {
    conn: Connection,
}

impl SqliteEventLog {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(path.clone()).await.map_err(storage_err)?;

        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(storage_err)?;

        info!(path = %path.display(), "event log opened");
        Ok(Self { conn })
    }

    /// In-memory log for tests and ephemeral runs.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().await.map_err(storage_err)?;
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(storage_err)?;
        Ok(Self { conn })
    }
}

fn storage_err(e: tokio_rusqlite::Error) -> Error {
    Error::storage(e.to_string())
}

fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeEvent> {
    let timestamp: String = row.get(1)?;
    let address: String = row.get(2)?;
    Ok(ChangeEvent {
        id: row.get(0)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
        address: address.parse().map_err(|e: std::net::AddrParseError| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?,
        city: row.get(3)?,
        region: row.get(4)?,
        country: row.get(5)?,
    })
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn append(&self, event: NewChangeEvent) -> Result<ChangeEvent, Error> {
        let stored = event.clone();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO change_events (timestamp, address, city, region, country)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        encode_timestamp(event.timestamp),
                        event.address.to_string(),
                        event.city,
                        event.region,
                        event.country,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(storage_err)?;

        debug!(id, address = %stored.address, "change event appended");
        Ok(ChangeEvent {
            id,
            timestamp: stored.timestamp,
            address: stored.address,
            city: stored.city,
            region: stored.region,
            country: stored.country,
        })
    }

    async fn query_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ChangeEvent>, Error> {
        let from = encode_timestamp(from);
        let to = encode_timestamp(to);
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, timestamp, address, city, region, country
                     FROM change_events
                     WHERE timestamp >= ?1 AND timestamp < ?2
                     ORDER BY timestamp ASC, id ASC",
                )?;
                let events = stmt
                    .query_map(rusqlite::params![from, to], event_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(events)
            })
            .await
            .map_err(storage_err)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ChangeEvent>, Error> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, timestamp, address, city, region, country
                     FROM change_events
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?1",
                )?;
                let events = stmt
                    .query_map(rusqlite::params![limit as i64], event_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(events)
            })
            .await
            .map_err(storage_err)
    }

    async fn find_address(&self, address: IpAddr) -> Result<Vec<ChangeEvent>, Error> {
        let address = address.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, timestamp, address, city, region, country
                     FROM change_events
                     WHERE address = ?1
                     ORDER BY timestamp DESC, id DESC",
                )?;
                let events = stmt
                    .query_map(rusqlite::params![address], event_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(events)
            })
            .await
            .map_err(storage_err)
    }

    async fn count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| {
                let n: i64 =
                    conn.query_row("SELECT COUNT(*) FROM change_events", [], |row| row.get(0))?;
                Ok(n as u64)
            })
            .await
            .map_err(storage_err)
    }

    async fn distinct_address_count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(DISTINCT address) FROM change_events",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n as u64)
            })
            .await
            .map_err(storage_err)
    }
}
