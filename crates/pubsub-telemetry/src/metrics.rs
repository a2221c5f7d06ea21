//! Prometheus metrics for the queue pub/sub engine.
//!
//! All metrics follow the naming convention: `pubsub_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., messages_published_total)
//! - **Gauge**: Value that can go up or down (e.g., active_subscriptions)

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

/// Poll cycle outcome labels.
pub mod outcome {
    pub const DELIVERED: &str = "delivered";
    pub const SKIPPED: &str = "skipped";
    pub const EMPTY: &str = "empty";
    pub const ERROR: &str = "error";
}

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PUBLISH METRICS
    // =========================================================================

    /// Messages handed to the transport successfully
    pub static ref MESSAGES_PUBLISHED: Counter = Counter::new(
        "pubsub_publish_messages_total",
        "Total messages sent to the queue"
    ).expect("metric creation failed");

    /// Publish calls that returned an error
    pub static ref PUBLISH_FAILURES: Counter = Counter::new(
        "pubsub_publish_failures_total",
        "Total publish calls that failed (encoding, provisioning or send)"
    ).expect("metric creation failed");

    // =========================================================================
    // QUEUE LIFECYCLE METRICS
    // =========================================================================

    /// Managed queues created
    pub static ref QUEUES_PROVISIONED: Counter = Counter::new(
        "pubsub_queue_provisioned_total",
        "Total managed queues created"
    ).expect("metric creation failed");

    /// Managed queues deleted
    pub static ref QUEUES_DELETED: Counter = Counter::new(
        "pubsub_queue_deleted_total",
        "Total managed queues deleted"
    ).expect("metric creation failed");

    // =========================================================================
    // POLL LOOP METRICS
    // =========================================================================

    /// Poll cycles by outcome
    pub static ref POLL_CYCLES: CounterVec = CounterVec::new(
        Opts::new("pubsub_poll_cycles_total", "Poll cycles by outcome"),
        &["outcome"]  // outcome: delivered/skipped/empty/error
    ).expect("metric creation failed");

    /// Poll errors by kind
    pub static ref POLL_ERRORS: CounterVec = CounterVec::new(
        Opts::new("pubsub_poll_errors_total", "Poll cycle errors by kind"),
        &["kind"]  // kind: provision/receive/delete/decode/handler
    ).expect("metric creation failed");

    /// Poll loops currently running
    pub static ref ACTIVE_SUBSCRIPTIONS: Gauge = Gauge::new(
        "pubsub_active_subscriptions",
        "Number of running poll loops"
    ).expect("metric creation failed");
}

/// Handle for the registered metrics
pub struct MetricsHandle {
    registry: Arc<Registry>,
}

impl MetricsHandle {
    /// Render every registered metric in the Prometheus text format.
    pub fn render(&self) -> Result<String, TelemetryError> {
        encode(&self.registry)
    }
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; collectors that are already registered are
/// left in place.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Publish
        Box::new(MESSAGES_PUBLISHED.clone()),
        Box::new(PUBLISH_FAILURES.clone()),
        // Queue lifecycle
        Box::new(QUEUES_PROVISIONED.clone()),
        Box::new(QUEUES_DELETED.clone()),
        // Poll loop
        Box::new(POLL_CYCLES.clone()),
        Box::new(POLL_ERRORS.clone()),
        Box::new(ACTIVE_SUBSCRIPTIONS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: Arc::new(REGISTRY.clone()),
    })
}

/// Render the global registry in the Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    encode(&REGISTRY)
}

fn encode(registry: &Registry) -> Result<String, TelemetryError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Record the outcome of a single poll cycle.
pub fn record_poll_cycle(outcome: &str) {
    POLL_CYCLES.with_label_values(&[outcome]).inc();
}

/// Record a poll cycle error of the given kind.
pub fn record_poll_error(kind: &str) {
    POLL_ERRORS.with_label_values(&[kind]).inc();
    record_poll_cycle(outcome::ERROR);
}
