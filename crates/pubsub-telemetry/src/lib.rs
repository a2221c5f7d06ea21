//! # Pub/Sub Telemetry
//!
//! Logging and metrics for the queue pub/sub engine.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events rendered by `tracing-subscriber` (plain or JSON)
//! - **Metrics**: Prometheus counters and gauges for publish, queue lifecycle
//!   and poll loop activity
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pubsub_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // Engine logs and metrics are now collected
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PUBSUB_SERVICE_NAME` | `queue-pubsub` | Service name in logs |
//! | `PUBSUB_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` also honoured) |
//! | `PUBSUB_JSON_LOGS` | `false` | JSON log lines (auto-enabled in containers) |
//! | `PUBSUB_METRICS` | `true` | Register Prometheus collectors |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, StructuredLogger};
pub use metrics::{gather_metrics, register_metrics, MetricsHandle};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and, when enabled, metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = if config.metrics_enabled {
        Some(register_metrics()?)
    } else {
        None
    };

    let logger = init_logging(&config)?;

    tracing::info!(service = %config.service_name, "Telemetry initialized");

    Ok(TelemetryGuard {
        _logger: logger,
        metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logger: StructuredLogger,
    metrics: Option<MetricsHandle>,
}

impl TelemetryGuard {
    /// Metrics handle, when metrics were enabled.
    pub fn metrics(&self) -> Option<&MetricsHandle> {
        self.metrics.as_ref()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
