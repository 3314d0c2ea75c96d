//! Event channel
//!
//! WebSocket control plane (`/ws`) and the broadcast hub behind it.

pub mod connection;
pub mod hub;
pub mod message;

pub use hub::BroadcastHub;
