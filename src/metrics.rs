// Prometheus metrics definitions for the NPC backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Live WebSocket connections.
    pub static ref CONNECTED_SESSIONS: IntGauge =
        IntGauge::new("npc_connected_sessions", "Live WebSocket connections").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Envelopes routed, by kind ("chat", "system", "event", "unknown").
    pub static ref ENVELOPES_ROUTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("npc_envelopes_routed_total", "Envelopes routed by kind"),
        &["kind"],
    )
    .unwrap();

    /// Error envelopes returned to clients.
    pub static ref ERROR_ENVELOPES_TOTAL: IntCounter = IntCounter::new(
        "npc_error_envelopes_total",
        "Error envelopes returned to clients",
    )
    .unwrap();

    /// Completion provider failures (any error kind).
    pub static ref COMPLETION_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "npc_completion_failures_total",
        "Completion provider failures",
    )
    .unwrap();

    /// Inbound SMS webhooks processed.
    pub static ref SMS_RECEIVED_TOTAL: IntCounter = IntCounter::new(
        "npc_sms_received_total",
        "Inbound SMS webhooks processed",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Completion provider request duration in seconds.
    pub static ref COMPLETION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "npc_completion_duration_seconds",
            "Completion provider request duration in seconds",
        )
        .buckets(vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(CONNECTED_SESSIONS.clone()),
        Box::new(ENVELOPES_ROUTED_TOTAL.clone()),
        Box::new(ERROR_ENVELOPES_TOTAL.clone()),
        Box::new(COMPLETION_FAILURES_TOTAL.clone()),
        Box::new(SMS_RECEIVED_TOTAL.clone()),
        Box::new(COMPLETION_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        REGISTRY.register(c).expect("failed to register metric");
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics_returns_string() {
        register_metrics();
        let output = gather_metrics();
        assert!(output.is_empty() || output.contains("npc_"));
    }

    #[test]
    fn test_metric_increments() {
        CONNECTED_SESSIONS.inc();
        CONNECTED_SESSIONS.dec();
        assert_eq!(CONNECTED_SESSIONS.get(), 0);

        ENVELOPES_ROUTED_TOTAL.with_label_values(&["chat"]).inc();
        ERROR_ENVELOPES_TOTAL.inc();
        COMPLETION_FAILURES_TOTAL.inc();
        SMS_RECEIVED_TOTAL.inc();
        COMPLETION_DURATION_SECONDS.observe(0.8);
    }
}
