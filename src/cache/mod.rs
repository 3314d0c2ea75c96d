//! Cache store
//!
//! Durable key/value with TTL plus the pub/sub channel that carries committed
//! snapshots to the broadcast hub. Values are opaque strings; callers
//! serialise with serde_json.

mod store;

pub use store::CacheStore;
