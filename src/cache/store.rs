/// Redis-backed cache store
///
/// One connection manager for key/value traffic and a dedicated pub/sub
/// connection per subscription. TTLs are enforced by the store itself; the
/// pub/sub transport is at-least-once with no persistence, so a subscriber
/// attached after a publication never sees it.
use crate::errors::TrackerResult;
use crate::logger::{self, LogTag};
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

/// Buffer between the pub/sub pump task and a subscriber. Fan-out is
/// fire-and-forget; a full buffer drops the oldest pending delivery.
const SUBSCRIPTION_BUFFER: usize = 256;

#[derive(Clone)]
pub struct CacheStore {
    client: redis::Client,
    manager: ConnectionManager,
}

impl CacheStore {
    pub async fn connect(redis_url: &str) -> TrackerResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        logger::info(LogTag::Cache, &format!("connected to {}", redis_url));
        Ok(Self { client, manager })
    }

    pub async fn ping(&self) -> TrackerResult<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> TrackerResult<Option<String>> {
        let mut conn = self.manager.clone();
        Ok(conn.get(key).await?)
    }

    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> TrackerResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    pub async fn set_permanent(&self, key: &str, value: &str) -> TrackerResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    /// Set-if-absent with no expiry. Returns true when this caller won the
    /// key; the queue uses it for cluster-wide mutual exclusion.
    pub async fn set_nx(&self, key: &str, value: &str) -> TrackerResult<bool> {
        let mut conn = self.manager.clone();
        Ok(conn.set_nx(key, value).await?)
    }

    pub async fn exists(&self, key: &str) -> TrackerResult<bool> {
        let mut conn = self.manager.clone();
        Ok(conn.exists(key).await?)
    }

    pub async fn delete(&self, keys: &[String]) -> TrackerResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        let _: () = conn.del(keys).await?;
        Ok(())
    }

    pub async fn scan_by_prefix(&self, prefix: &str) -> TrackerResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", prefix);
        let mut keys = Vec::new();
        let mut iter = conn.scan_match::<_, String>(pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    // JSON conveniences over the opaque-string contract.

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> TrackerResult<Option<T>> {
        match self.get(key).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(err) => {
                    // A corrupt entry behaves like a miss; the writer will
                    // replace it on the next refresh.
                    logger::warning(
                        LogTag::Cache,
                        &format!("dropping undecodable entry {}: {}", key, err),
                    );
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn set_json_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> TrackerResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(|err| crate::errors::TrackerError::Cache(err.to_string()))?;
        self.set_with_ttl(key, &raw, ttl_secs).await
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> TrackerResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    /// Subscribe to a channel. Returns a receiver fed by a background pump;
    /// dropping the receiver is the (idempotent) unsubscribe.
    pub async fn subscribe(&self, channel: &str) -> TrackerResult<mpsc::Receiver<String>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let channel = channel.to_string();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        logger::warning(
                            LogTag::Cache,
                            &format!("undecodable message on {}: {}", channel, err),
                        );
                        continue;
                    }
                };
                if tx.send(payload).await.is_err() {
                    // Receiver dropped: the subscription is over.
                    break;
                }
            }
            logger::debug(LogTag::Cache, &format!("subscription to {} ended", channel));
        });

        Ok(rx)
    }
}
