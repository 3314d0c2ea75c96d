//! HTTP and WebSocket surface
//!
//! Thin glue: axum routes under `/api`, the `/ws` event channel, shared
//! state and server lifecycle. All domain logic lives in the components.

pub mod routes;
pub mod server;
pub mod state;
pub mod ws;

pub use state::AppState;
