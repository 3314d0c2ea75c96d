/// Prometheus metrics
///
/// One registry owned by a `Metrics` struct that is constructed at startup
/// and shared by every component. Exposition happens at `GET /api/metrics`.
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,

    /// Committed persist-then-publish updates.
    pub price_updates: IntCounter,
    /// Ticks that failed for transient reasons.
    pub update_failures: IntCounter,
    /// Mints banned after failing validation.
    pub invalid_mints: IntCounter,
    /// Throttle responses per upstream source.
    pub upstream_throttles: IntCounterVec,
    /// Live WebSocket connections.
    pub ws_connections: IntGauge,
    /// Live (connection, mint) subscription pairs.
    pub ws_subscriptions: IntGauge,
    /// Repeating jobs currently registered.
    pub active_jobs: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let price_updates = IntCounter::with_opts(Opts::new(
            "mintstream_price_updates_total",
            "Committed price updates",
        ))
        .unwrap();
        let update_failures = IntCounter::with_opts(Opts::new(
            "mintstream_update_failures_total",
            "Failed update ticks",
        ))
        .unwrap();
        let invalid_mints = IntCounter::with_opts(Opts::new(
            "mintstream_invalid_mints_total",
            "Mints banned after validation failure",
        ))
        .unwrap();
        let upstream_throttles = IntCounterVec::new(
            Opts::new(
                "mintstream_upstream_throttles_total",
                "Throttle responses per upstream",
            ),
            &["source"],
        )
        .unwrap();
        let ws_connections = IntGauge::with_opts(Opts::new(
            "mintstream_ws_connections",
            "Open WebSocket connections",
        ))
        .unwrap();
        let ws_subscriptions = IntGauge::with_opts(Opts::new(
            "mintstream_ws_subscriptions",
            "Active subscription pairs",
        ))
        .unwrap();
        let active_jobs = IntGauge::with_opts(Opts::new(
            "mintstream_active_jobs",
            "Registered repeating jobs",
        ))
        .unwrap();

        for collector in [
            Box::new(price_updates.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(update_failures.clone()),
            Box::new(invalid_mints.clone()),
            Box::new(upstream_throttles.clone()),
            Box::new(ws_connections.clone()),
            Box::new(ws_subscriptions.clone()),
            Box::new(active_jobs.clone()),
        ] {
            registry.register(collector).unwrap();
        }

        Self {
            registry,
            price_updates,
            update_failures,
            invalid_mints,
            upstream_throttles,
            ws_connections,
            ws_subscriptions,
            active_jobs,
        }
    }

    /// Text exposition of everything registered.
    pub fn export(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_the_exposition() {
        let metrics = Metrics::new();
        metrics.price_updates.inc();
        metrics.upstream_throttles.with_label_values(&["dexscreener"]).inc();

        let text = metrics.export();
        assert!(text.contains("mintstream_price_updates_total 1"));
        assert!(text.contains("mintstream_upstream_throttles_total"));
        assert!(text.contains("dexscreener"));
    }
}
