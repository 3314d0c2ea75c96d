/// Broadcast hub
///
/// Subscriber registry and per-mint rooms. The hub subscribes once to the
/// cache store's `price_update` channel; every received snapshot fans out to
/// the members of `token:<mint>` and nobody else. Delivery to a connection is
/// a bounded try_send — a slow client drops frames, it never stalls the hub.
use crate::cache::CacheStore;
use crate::constants::PRICE_UPDATE_CHANNEL;
use crate::logger::{self, short_mint, LogTag};
use crate::services::Metrics;
use crate::types::PriceSnapshot;
use crate::webserver::ws::message::{room_for, ServerEvent};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

pub type ConnectionId = u64;

/// Per-client outbound buffer; overflow drops frames for that client only.
const CONNECTION_BUFFER: usize = 256;

struct ConnectionHandle {
    sender: mpsc::Sender<String>,
    subscriptions: HashSet<String>,
}

pub struct BroadcastHub {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    rooms: RwLock<HashMap<String, HashSet<ConnectionId>>>,
    next_conn_id: AtomicU64,
    metrics: Arc<Metrics>,
}

impl BroadcastHub {
    pub fn new(metrics: Arc<Metrics>) -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            metrics,
        })
    }

    // =========================================================================
    // REGISTRY
    // =========================================================================

    pub async fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);

        self.connections.write().await.insert(
            conn_id,
            ConnectionHandle {
                sender: tx,
                subscriptions: HashSet::new(),
            },
        );
        self.metrics.ws_connections.inc();
        (conn_id, rx)
    }

    /// Drop the connection record and leave every room it was in.
    pub async fn unregister(&self, conn_id: ConnectionId) {
        let handle = self.connections.write().await.remove(&conn_id);
        if let Some(handle) = handle {
            self.metrics.ws_connections.dec();
            self.metrics
                .ws_subscriptions
                .sub(handle.subscriptions.len() as i64);

            let mut rooms = self.rooms.write().await;
            for mint in &handle.subscriptions {
                if let Some(members) = rooms.get_mut(&room_for(mint)) {
                    members.remove(&conn_id);
                    if members.is_empty() {
                        rooms.remove(&room_for(mint));
                    }
                }
            }
        }
    }

    pub async fn is_subscribed(&self, conn_id: ConnectionId, mint: &str) -> bool {
        self.connections
            .read()
            .await
            .get(&conn_id)
            .map(|handle| handle.subscriptions.contains(mint))
            .unwrap_or(false)
    }

    /// Add the (connection, mint) pair and join the room. Returns the
    /// connection's subscription count afterwards.
    pub async fn add_subscription(&self, conn_id: ConnectionId, mint: &str) -> usize {
        let count = {
            let mut connections = self.connections.write().await;
            match connections.get_mut(&conn_id) {
                Some(handle) => {
                    if handle.subscriptions.insert(mint.to_string()) {
                        self.metrics.ws_subscriptions.inc();
                    }
                    handle.subscriptions.len()
                }
                None => return 0,
            }
        };

        self.rooms
            .write()
            .await
            .entry(room_for(mint))
            .or_default()
            .insert(conn_id);
        count
    }

    /// Remove the pair and leave the room. Returns the remaining count.
    pub async fn remove_subscription(&self, conn_id: ConnectionId, mint: &str) -> usize {
        let count = {
            let mut connections = self.connections.write().await;
            match connections.get_mut(&conn_id) {
                Some(handle) => {
                    if handle.subscriptions.remove(mint) {
                        self.metrics.ws_subscriptions.dec();
                    }
                    handle.subscriptions.len()
                }
                None => return 0,
            }
        };

        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(&room_for(mint)) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(&room_for(mint));
            }
        }
        count
    }

    // =========================================================================
    // DELIVERY
    // =========================================================================

    /// Send one frame to one connection.
    pub async fn send_to(&self, conn_id: ConnectionId, frame: String) {
        let connections = self.connections.read().await;
        if let Some(handle) = connections.get(&conn_id) {
            if handle.sender.try_send(frame).is_err() {
                logger::debug(
                    LogTag::Hub,
                    &format!("frame dropped for connection {} (queue full)", conn_id),
                );
            }
        }
    }

    /// Fan a snapshot out to the members of its mint's room.
    pub async fn deliver_snapshot(&self, snapshot: &PriceSnapshot) {
        let members: Vec<ConnectionId> = {
            let rooms = self.rooms.read().await;
            match rooms.get(&room_for(&snapshot.mint)) {
                Some(members) => members.iter().copied().collect(),
                None => return,
            }
        };

        let frame = ServerEvent::PriceUpdate(snapshot.clone()).to_frame();
        let connections = self.connections.read().await;
        for conn_id in members {
            if let Some(handle) = connections.get(&conn_id) {
                if handle.sender.try_send(frame.clone()).is_err() {
                    logger::debug(
                        LogTag::Hub,
                        &format!(
                            "price_update for {} dropped on connection {}",
                            short_mint(&snapshot.mint),
                            conn_id
                        ),
                    );
                }
            }
        }
    }

    /// Subscribe to the cache store's channel and fan out until shutdown.
    /// Reconnects with a pause when the subscription dies.
    pub fn start_fanout(self: Arc<Self>, cache: Arc<CacheStore>) {
        tokio::spawn(async move {
            loop {
                let mut rx = match cache.subscribe(PRICE_UPDATE_CHANNEL).await {
                    Ok(rx) => rx,
                    Err(err) => {
                        logger::warning(
                            LogTag::Hub,
                            &format!("pub/sub subscription failed, retrying: {}", err),
                        );
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                logger::info(LogTag::Hub, "fan-out attached to price_update channel");
                while let Some(payload) = rx.recv().await {
                    match serde_json::from_str::<PriceSnapshot>(&payload) {
                        Ok(snapshot) => self.deliver_snapshot(&snapshot).await,
                        Err(err) => logger::warning(
                            LogTag::Hub,
                            &format!("undecodable price_update dropped: {}", err),
                        ),
                    }
                }
                logger::warning(LogTag::Hub, "pub/sub stream ended, resubscribing");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_hub() -> Arc<BroadcastHub> {
        BroadcastHub::new(Arc::new(Metrics::new()))
    }

    fn snapshot(mint: &str) -> PriceSnapshot {
        PriceSnapshot {
            mint: mint.to_string(),
            price_usd: 1.5,
            price_native: 0.01,
            market_cap: 1_500_000.0,
            total_supply: 1_000_000.0,
            as_of: Utc::now(),
        }
    }

    #[tokio::test]
    async fn snapshots_reach_only_the_mints_room() {
        let hub = test_hub();
        let (c1, mut rx1) = hub.register().await;
        let (c2, mut rx2) = hub.register().await;
        let (_c3, mut rx3) = hub.register().await;

        hub.add_subscription(c1, "MintA").await;
        hub.add_subscription(c2, "MintA").await;

        hub.deliver_snapshot(&snapshot("MintA")).await;

        let frame1 = rx1.try_recv().unwrap();
        let frame2 = rx2.try_recv().unwrap();
        assert!(frame1.contains("price_update"));
        assert_eq!(frame1, frame2);
        assert!(rx3.try_recv().is_err());

        // Each subscriber got it exactly once.
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn foreign_mints_do_not_leak_into_a_room() {
        let hub = test_hub();
        let (c1, mut rx1) = hub.register().await;
        hub.add_subscription(c1, "MintA").await;

        hub.deliver_snapshot(&snapshot("MintB")).await;
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscription_counts_track_the_pair_set() {
        let hub = test_hub();
        let (c1, _rx) = hub.register().await;

        assert_eq!(hub.add_subscription(c1, "MintA").await, 1);
        assert!(hub.is_subscribed(c1, "MintA").await);
        // Re-adding the same pair does not double it.
        assert_eq!(hub.add_subscription(c1, "MintA").await, 1);
        assert_eq!(hub.add_subscription(c1, "MintB").await, 2);
        assert_eq!(hub.remove_subscription(c1, "MintA").await, 1);
        assert!(!hub.is_subscribed(c1, "MintA").await);
    }

    #[tokio::test]
    async fn unregister_leaves_every_room() {
        let hub = test_hub();
        let (c1, rx1) = hub.register().await;
        let (c2, mut rx2) = hub.register().await;
        hub.add_subscription(c1, "MintA").await;
        hub.add_subscription(c2, "MintA").await;

        drop(rx1);
        hub.unregister(c1).await;

        hub.deliver_snapshot(&snapshot("MintA")).await;
        assert!(rx2.try_recv().is_ok());
        assert!(!hub.is_subscribed(c1, "MintA").await);
    }
}
