//! Prometheus metrics for the template service.
//!
//! - Change feed metrics (events received, dispositions)
//! - Moderation metrics (decisions, analyzer failures and latency, commit outcomes)
//! - Search metrics (requests by mode, latency, results)
//! - Store metrics (backend errors)

mod helpers;

pub use helpers::{encode_metrics, ChangeFeedMetrics, ModerationMetrics, SearchMetrics, StoreMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "templates";

lazy_static! {
    // ============================================================================
    // Change Feed Metrics
    // ============================================================================

    /// Change events pulled from the feed
    pub static ref CHANGE_EVENTS_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_change_events_received_total", METRIC_PREFIX),
        "Total change events received from the content store"
    ).unwrap();

    /// What the dispatcher did with each event
    pub static ref CHANGE_EVENTS_DISPOSITION_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_change_events_disposition_total", METRIC_PREFIX),
        "Change events by dispatcher disposition",
        &["disposition"]
    ).unwrap();

    /// Events dropped because the consumer fell behind the feed
    pub static ref CHANGE_EVENTS_LAGGED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_change_events_lagged_total", METRIC_PREFIX),
        "Change events skipped because the consumer lagged"
    ).unwrap();

    /// Batches handed to the dispatcher
    pub static ref CHANGE_BATCH_SIZE: Histogram = register_histogram!(
        format!("{}_change_batch_size", METRIC_PREFIX),
        "Number of events per dispatched batch",
        vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]
    ).unwrap();

    // ============================================================================
    // Moderation Metrics
    // ============================================================================

    /// Decisions produced by the moderation engine
    pub static ref MODERATION_DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_moderation_decisions_total", METRIC_PREFIX),
        "Moderation decisions by status",
        &["status"]
    ).unwrap();

    /// Analyzer failures (timeout, unavailable, bad response)
    pub static ref ANALYZER_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_analyzer_failures_total", METRIC_PREFIX),
        "Analyzer capability failures by kind",
        &["kind"]
    ).unwrap();

    /// Analyzer call latency
    pub static ref ANALYZER_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_analyzer_latency_seconds", METRIC_PREFIX),
        "Analyzer call latency in seconds",
        &["method"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ).unwrap();

    /// Outcomes of conditional moderation write-backs
    pub static ref COMMIT_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_commit_outcomes_total", METRIC_PREFIX),
        "Moderation commit outcomes",
        &["outcome"]
    ).unwrap();

    /// Commit retries after retryable conflicts
    pub static ref COMMIT_RETRIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_commit_retries_total", METRIC_PREFIX),
        "Total moderation commit retries"
    ).unwrap();

    /// Events currently being moderated
    pub static ref MODERATION_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_moderation_in_flight", METRIC_PREFIX),
        "Number of events currently being moderated"
    ).unwrap();

    // ============================================================================
    // Search Metrics
    // ============================================================================

    /// Search requests by mode (scored, browse)
    pub static ref SEARCH_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_search_requests_total", METRIC_PREFIX),
        "Search requests by mode",
        &["mode"]
    ).unwrap();

    /// Search failures by kind
    pub static ref SEARCH_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_search_errors_total", METRIC_PREFIX),
        "Search failures by kind",
        &["kind"]
    ).unwrap();

    /// End-to-end search latency including candidate fetch
    pub static ref SEARCH_LATENCY: Histogram = register_histogram!(
        format!("{}_search_latency_seconds", METRIC_PREFIX),
        "Search latency in seconds",
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    ).unwrap();

    /// Matches per search before pagination
    pub static ref SEARCH_MATCHES: Histogram = register_histogram!(
        format!("{}_search_matches", METRIC_PREFIX),
        "Number of matching templates per search",
        vec![0.0, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    ).unwrap();

    // ============================================================================
    // Store Metrics
    // ============================================================================

    /// Content store errors by operation
    pub static ref STORE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_store_errors_total", METRIC_PREFIX),
        "Content store errors by operation",
        &["operation"]
    ).unwrap();

    /// Redis circuit breaker state (0=closed, 1=open, 2=half-open)
    pub static ref REDIS_CIRCUIT_BREAKER_STATE: IntGauge = register_int_gauge!(
        format!("{}_redis_circuit_breaker_state", METRIC_PREFIX),
        "Redis circuit breaker state (0=closed, 1=open, 2=half-open)"
    ).unwrap();

    /// Reconnects of the Redis change feed subscription
    pub static ref REDIS_FEED_RECONNECTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_redis_feed_reconnects_total", METRIC_PREFIX),
        "Total Redis change feed resubscriptions"
    ).unwrap();
}
