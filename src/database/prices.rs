use crate::database::connection::{format_ts, parse_ts, Database};
use crate::database::HistoryEntry;
use crate::errors::TrackerResult;
use crate::types::PriceSnapshot;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

fn row_to_snapshot(row: &Row) -> rusqlite::Result<PriceSnapshot> {
    Ok(PriceSnapshot {
        mint: row.get(0)?,
        price_usd: row.get(1)?,
        price_native: row.get(2)?,
        market_cap: row.get(3)?,
        total_supply: row.get(4)?,
        as_of: parse_ts(&row.get::<_, String>(5)?)?,
    })
}

impl Database {
    /// Insert-or-replace the latest row and append one history entry in a
    /// single transaction. This is the only write path the pricing engine
    /// uses; either both rows land or neither does.
    pub fn record_snapshot(&self, snapshot: &PriceSnapshot) -> TrackerResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO token_prices (
                mint, price_usd, price_native, market_cap, total_supply, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.mint,
                snapshot.price_usd,
                snapshot.price_native,
                snapshot.market_cap,
                snapshot.total_supply,
                format_ts(snapshot.as_of)
            ],
        )?;

        tx.execute(
            "INSERT INTO price_history (mint, price_usd, price_native, market_cap, at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.mint,
                snapshot.price_usd,
                snapshot.price_native,
                snapshot.market_cap,
                format_ts(snapshot.as_of)
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn get_latest(&self, mint: &str) -> TrackerResult<Option<PriceSnapshot>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT mint, price_usd, price_native, market_cap, total_supply, last_updated
             FROM token_prices WHERE mint = ?1",
        )?;
        let mut rows = stmt.query_map([mint], row_to_snapshot)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Page through latest rows, newest first. Returns the page plus the
    /// total row count for pagination headers.
    pub fn list_latest(
        &self,
        offset: u64,
        limit: u64,
    ) -> TrackerResult<(Vec<PriceSnapshot>, u64)> {
        let conn = self.conn.lock().unwrap();

        let total: u64 = conn.query_row("SELECT COUNT(*) FROM token_prices", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT mint, price_usd, price_native, market_cap, total_supply, last_updated
             FROM token_prices ORDER BY last_updated DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit, offset], row_to_snapshot)?;

        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?);
        }
        Ok((snapshots, total))
    }

    /// History entries for a mint inside [from, to], ascending by time,
    /// capped. The cap bounds response size, not correctness; callers pass
    /// the documented 1000.
    pub fn history_in_range(
        &self,
        mint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cap: usize,
    ) -> TrackerResult<Vec<HistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, mint, price_usd, price_native, market_cap, at
             FROM price_history
             WHERE mint = ?1 AND at >= ?2 AND at <= ?3
             ORDER BY at ASC LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![mint, format_ts(from), format_ts(to), cap as i64],
            |row| {
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    mint: row.get(1)?,
                    price_usd: row.get(2)?,
                    price_native: row.get(3)?,
                    market_cap: row.get(4)?,
                    at: parse_ts(&row.get::<_, String>(5)?)?,
                })
            },
        )?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Delete the latest row and all history for a mint atomically.
    pub fn purge_mint(&self, mint: &str) -> TrackerResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM token_prices WHERE mint = ?1", [mint])?;
        tx.execute("DELETE FROM price_history WHERE mint = ?1", [mint])?;
        tx.commit()?;
        Ok(())
    }

    /// Every mint with a latest row; the scheduler re-enrols these at boot.
    pub fn distinct_latest_mints(&self) -> TrackerResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT mint FROM token_prices")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut mints = Vec::new();
        for row in rows {
            mints.push(row?);
        }
        Ok(mints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snapshot(mint: &str, price: f64, as_of: DateTime<Utc>) -> PriceSnapshot {
        PriceSnapshot {
            mint: mint.to_string(),
            price_usd: price,
            price_native: price / 150.0,
            market_cap: price * 1_000_000.0,
            total_supply: 1_000_000.0,
            as_of,
        }
    }

    #[test]
    fn upsert_replaces_the_single_latest_row() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        db.record_snapshot(&snapshot("MintA", 1.0, now)).unwrap();
        db.record_snapshot(&snapshot("MintA", 2.0, now + Duration::seconds(1)))
            .unwrap();

        let latest = db.get_latest("MintA").unwrap().unwrap();
        assert_eq!(latest.price_usd, 2.0);

        let (_, total) = db.list_latest(0, 10).unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn history_ids_strictly_increase() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        for i in 0..5 {
            db.record_snapshot(&snapshot("MintA", i as f64, now + Duration::seconds(i)))
                .unwrap();
        }

        let entries = db
            .history_in_range("MintA", now - Duration::hours(1), now + Duration::hours(1), 1000)
            .unwrap();
        assert_eq!(entries.len(), 5);
        for pair in entries.windows(2) {
            assert!(pair[1].id > pair[0].id);
            assert!(pair[1].at >= pair[0].at);
        }
    }

    #[test]
    fn history_window_is_inclusive_ascending_and_capped() {
        let db = Database::open_in_memory().unwrap();
        let base = Utc::now();

        for i in 0..300 {
            db.record_snapshot(&snapshot("MintA", i as f64, base + Duration::seconds(i)))
                .unwrap();
        }

        // Window covering the last 100 seconds only.
        let from = base + Duration::seconds(200);
        let to = base + Duration::seconds(299);
        let entries = db.history_in_range("MintA", from, to, 1000).unwrap();
        assert_eq!(entries.len(), 100);
        assert_eq!(entries.first().unwrap().price_usd, 200.0);
        assert_eq!(entries.last().unwrap().price_usd, 299.0);

        // Cap applies after the range filter.
        let capped = db.history_in_range("MintA", from, to, 10).unwrap();
        assert_eq!(capped.len(), 10);
        assert_eq!(capped.first().unwrap().price_usd, 200.0);
    }

    #[test]
    fn history_is_scoped_per_mint() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        db.record_snapshot(&snapshot("MintA", 1.0, now)).unwrap();
        db.record_snapshot(&snapshot("MintB", 2.0, now)).unwrap();

        let entries = db
            .history_in_range("MintA", now - Duration::hours(1), now + Duration::hours(1), 1000)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mint, "MintA");
    }

    #[test]
    fn purge_removes_latest_and_history() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        db.record_snapshot(&snapshot("MintA", 1.0, now)).unwrap();
        db.record_snapshot(&snapshot("MintB", 2.0, now)).unwrap();
        db.purge_mint("MintA").unwrap();

        assert!(db.get_latest("MintA").unwrap().is_none());
        assert!(db.get_latest("MintB").unwrap().is_some());
        let entries = db
            .history_in_range("MintA", now - Duration::hours(1), now + Duration::hours(1), 1000)
            .unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn list_latest_orders_newest_first_and_paginates() {
        let db = Database::open_in_memory().unwrap();
        let base = Utc::now();

        for i in 0..5 {
            db.record_snapshot(&snapshot(
                &format!("Mint{}", i),
                i as f64,
                base + Duration::seconds(i),
            ))
            .unwrap();
        }

        let (page, total) = db.list_latest(0, 2).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].mint, "Mint4");
        assert_eq!(page[1].mint, "Mint3");

        let (page2, _) = db.list_latest(2, 2).unwrap();
        assert_eq!(page2[0].mint, "Mint2");
    }
}
