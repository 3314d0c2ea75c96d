/// End-to-end checks of the in-process pipeline pieces that need no network:
/// persist-then-publish payload fidelity, hub fan-out isolation, and the
/// windowed history contract after a burst of ticks.
use chrono::{Duration, TimeZone, Utc};
use mintstream::database::Database;
use mintstream::services::Metrics;
use mintstream::types::PriceSnapshot;
use mintstream::webserver::ws::hub::BroadcastHub;
use std::sync::Arc;

/// Whole-second reference instant so stored timestamps round-trip exactly.
fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn snapshot(mint: &str, tick: i64, base: chrono::DateTime<Utc>) -> PriceSnapshot {
    PriceSnapshot {
        mint: mint.to_string(),
        price_usd: 1.0 + tick as f64 * 0.01,
        price_native: 0.006 + tick as f64 * 0.0001,
        market_cap: 1_000_000.0,
        total_supply: 1_000_000.0,
        as_of: base + Duration::seconds(tick),
    }
}

#[test]
fn published_payload_round_trips_to_the_persisted_row() {
    let db = Database::open_in_memory().unwrap();
    let snap = snapshot("MintA", 0, t0());

    db.record_snapshot(&snap).unwrap();

    // The pub/sub payload is the serialised snapshot; whoever receives it
    // must find an identical latest row behind it.
    let payload = serde_json::to_string(&snap).unwrap();
    let wire: PriceSnapshot = serde_json::from_str(&payload).unwrap();
    let stored = db.get_latest("MintA").unwrap().unwrap();

    assert_eq!(wire.mint, stored.mint);
    assert_eq!(wire.price_usd, stored.price_usd);
    assert_eq!(wire.price_native, stored.price_native);
    assert_eq!(wire.market_cap, stored.market_cap);

    // And a history entry with identical fields exists.
    let history = db
        .history_in_range(
            "MintA",
            snap.as_of - Duration::seconds(1),
            snap.as_of + Duration::seconds(1),
            1000,
        )
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].price_usd, stored.price_usd);
}

#[tokio::test]
async fn two_subscribers_get_one_copy_each_and_bystanders_none() {
    let hub = BroadcastHub::new(Arc::new(Metrics::new()));
    let (c1, mut rx1) = hub.register().await;
    let (c2, mut rx2) = hub.register().await;
    let (_c3, mut rx3) = hub.register().await;

    hub.add_subscription(c1, "MintA").await;
    hub.add_subscription(c2, "MintA").await;

    hub.deliver_snapshot(&snapshot("MintA", 0, Utc::now())).await;

    assert!(rx1.try_recv().is_ok());
    assert!(rx1.try_recv().is_err());
    assert!(rx2.try_recv().is_ok());
    assert!(rx2.try_recv().is_err());
    assert!(rx3.try_recv().is_err());
}

#[test]
fn five_minute_window_returns_exactly_the_recent_ticks() {
    let db = Database::open_in_memory().unwrap();
    let now = t0();
    // 600 one-second ticks ending now.
    let base = now - Duration::seconds(599);
    for tick in 0..600 {
        db.record_snapshot(&snapshot("MintA", tick, base)).unwrap();
    }

    let from = now - Duration::minutes(5);
    let entries = db.history_in_range("MintA", from, now, 1000).unwrap();

    // The last 300 seconds of a 1 s cadence, boundaries inclusive.
    assert_eq!(entries.len(), 301);
    for pair in entries.windows(2) {
        assert!(pair[0].at <= pair[1].at);
        assert!(pair[0].id < pair[1].id);
    }
    assert_eq!(entries.first().unwrap().at, from);
    assert_eq!(entries.last().unwrap().at, now);
}

#[test]
fn history_cap_bounds_a_long_window() {
    let db = Database::open_in_memory().unwrap();
    let now = t0();
    let base = now - Duration::seconds(1199);
    for tick in 0..1200 {
        db.record_snapshot(&snapshot("MintA", tick, base)).unwrap();
    }

    let entries = db
        .history_in_range("MintA", now - Duration::hours(1), now, 1000)
        .unwrap();
    assert_eq!(entries.len(), 1000);
}
