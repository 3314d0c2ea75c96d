//! Persistent store
//!
//! SQLite-backed latest-state and append-only history. The latest row and the
//! history entry for one observation are always written in a single
//! transaction; see `Database::record_snapshot`.

pub mod connection;
pub mod prices;

pub use connection::Database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One append-only history row. Ids are strictly increasing under concurrent
/// appends (AUTOINCREMENT).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub mint: String,
    pub price_usd: f64,
    pub price_native: f64,
    pub market_cap: f64,
    pub at: DateTime<Utc>,
}
