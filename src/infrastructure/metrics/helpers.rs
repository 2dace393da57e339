//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    ANALYZER_FAILURES_TOTAL, ANALYZER_LATENCY, CHANGE_BATCH_SIZE, CHANGE_EVENTS_DISPOSITION_TOTAL,
    CHANGE_EVENTS_LAGGED_TOTAL, CHANGE_EVENTS_RECEIVED_TOTAL, COMMIT_OUTCOMES_TOTAL,
    COMMIT_RETRIES_TOTAL, MODERATION_DECISIONS_TOTAL, MODERATION_IN_FLIGHT,
    REDIS_CIRCUIT_BREAKER_STATE, REDIS_FEED_RECONNECTS_TOTAL, SEARCH_ERRORS_TOTAL,
    SEARCH_LATENCY, SEARCH_MATCHES, SEARCH_REQUESTS_TOTAL, STORE_ERRORS_TOTAL,
};
use crate::resilience::CircuitState;

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for change feed metrics
pub struct ChangeFeedMetrics;

impl ChangeFeedMetrics {
    pub fn record_received(count: u64) {
        CHANGE_EVENTS_RECEIVED_TOTAL.inc_by(count);
    }

    /// Record what the dispatcher decided for one event
    pub fn record_disposition(disposition: &str) {
        CHANGE_EVENTS_DISPOSITION_TOTAL
            .with_label_values(&[disposition])
            .inc();
    }

    pub fn record_lagged(count: u64) {
        CHANGE_EVENTS_LAGGED_TOTAL.inc_by(count);
    }

    pub fn observe_batch(size: usize) {
        CHANGE_BATCH_SIZE.observe(size as f64);
    }
}

/// Helper struct for moderation metrics
pub struct ModerationMetrics;

impl ModerationMetrics {
    pub fn record_decision(status: &str) {
        MODERATION_DECISIONS_TOTAL.with_label_values(&[status]).inc();
    }

    pub fn record_analyzer_failure(kind: &str) {
        ANALYZER_FAILURES_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn observe_analyzer_latency(method: &str, seconds: f64) {
        ANALYZER_LATENCY.with_label_values(&[method]).observe(seconds);
    }

    pub fn record_commit(outcome: &str) {
        COMMIT_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn record_retry() {
        COMMIT_RETRIES_TOTAL.inc();
    }

    pub fn in_flight_inc() {
        MODERATION_IN_FLIGHT.inc();
    }

    pub fn in_flight_dec() {
        MODERATION_IN_FLIGHT.dec();
    }
}

/// Helper struct for search metrics
pub struct SearchMetrics;

impl SearchMetrics {
    /// Record a completed search; `mode` is "scored" or "browse"
    pub fn record_search(mode: &str, matches: usize, seconds: f64) {
        SEARCH_REQUESTS_TOTAL.with_label_values(&[mode]).inc();
        SEARCH_MATCHES.observe(matches as f64);
        SEARCH_LATENCY.observe(seconds);
    }

    pub fn record_error(kind: &str) {
        SEARCH_ERRORS_TOTAL.with_label_values(&[kind]).inc();
    }
}

/// Helper struct for content store metrics
pub struct StoreMetrics;

impl StoreMetrics {
    pub fn record_error(operation: &str) {
        STORE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
    }

    pub fn set_circuit_state(state: CircuitState) {
        REDIS_CIRCUIT_BREAKER_STATE.set(state.gauge_value());
    }

    pub fn record_feed_reconnect() {
        REDIS_FEED_RECONNECTS_TOTAL.inc();
    }
}
