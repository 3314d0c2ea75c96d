use crate::errors::TrackerResult;
use crate::logger::{self, LogTag};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::sync::Mutex;

/// Main database connection wrapper
pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &str) -> TrackerResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize_tables()?;
        logger::info(LogTag::Database, &format!("opened {}", path));
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> TrackerResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize_tables()?;
        Ok(db)
    }

    fn initialize_tables(&self) -> TrackerResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS token_prices (
                mint TEXT PRIMARY KEY,
                price_usd REAL NOT NULL,
                price_native REAL NOT NULL,
                market_cap REAL NOT NULL,
                total_supply REAL NOT NULL,
                last_updated TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mint TEXT NOT NULL,
                price_usd REAL NOT NULL,
                price_native REAL NOT NULL,
                market_cap REAL NOT NULL,
                at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_price_history_mint_at
             ON price_history (mint, at)",
            [],
        )?;

        Ok(())
    }

    /// Cheap liveness probe for the health endpoint.
    pub fn health_check(&self) -> TrackerResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

/// Fixed-precision UTC timestamp. Lexicographic order on the column equals
/// chronological order, which the (mint, at) index relies on.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })
}
