//! Cross-cutting service utilities

pub mod metrics;

pub use metrics::Metrics;
