//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable console output (for development)
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Whether to register the Prometheus collectors
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "queue-pubsub".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PUBSUB_SERVICE_NAME`: Service name (default: queue-pubsub)
    /// - `PUBSUB_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `PUBSUB_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `PUBSUB_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `PUBSUB_METRICS`: Register Prometheus metrics (default: true)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("PUBSUB_SERVICE_NAME")
                .unwrap_or_else(|_| "queue-pubsub".to_string()),

            log_level: env::var("PUBSUB_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("PUBSUB_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v, true))
                .unwrap_or(true),

            json_logs: env::var("PUBSUB_JSON_LOGS")
                .map(|v| parse_flag(&v, false))
                .unwrap_or(is_container),

            metrics_enabled: env::var("PUBSUB_METRICS")
                .map(|v| parse_flag(&v, true))
                .unwrap_or(true),
        }
    }

    /// Configuration suited to test binaries: debug level, console only.
    pub fn for_tests() -> Self {
        Self {
            log_level: "debug".to_string(),
            metrics_enabled: false,
            ..Self::default()
        }
    }
}

/// Interpret a boolean-ish environment value, falling back on anything unrecognised.
fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
