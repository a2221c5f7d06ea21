//! Structured logging bootstrap.
//!
//! Installs a `tracing-subscriber` registry with an env filter and a fmt layer.
//! JSON output carries the same fields as the console output so log shippers
//! can index `trigger`, `queue` and `subscription` directly.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{TelemetryConfig, TelemetryError};

/// Structured logger handle
pub struct StructuredLogger {
    installed: bool,
}

impl StructuredLogger {
    /// Whether this call installed the global subscriber.
    ///
    /// `false` means another subscriber was already in place (a host
    /// application or a previous test) and was left untouched.
    pub fn installed(&self) -> bool {
        self.installed
    }
}

/// Initialize structured logging.
pub fn init_logging(config: &TelemetryConfig) -> Result<StructuredLogger, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(config.console_output)
            .boxed()
    };

    // A subscriber may already be installed by the host process
    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();

    tracing::debug!(
        service = %config.service_name,
        json_logs = config.json_logs,
        installed,
        "Structured logging configured"
    );

    Ok(StructuredLogger { installed })
}

/// Helper to create structured log entries with a consistent `trigger` field.
#[macro_export]
macro_rules! log_trigger_event {
    (info, $trigger:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            trigger = %$trigger,
            $($($field)*,)?
            $msg
        )
    };

    (warn, $trigger:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(
            trigger = %$trigger,
            $($($field)*,)?
            $msg
        )
    };

    (error, $trigger:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(
            trigger = %$trigger,
            $($($field)*,)?
            $msg
        )
    };

    (debug, $trigger:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            trigger = %$trigger,
            $($($field)*,)?
            $msg
        )
    };
}
