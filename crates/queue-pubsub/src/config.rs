//! Engine configuration.
//!
//! The presence of `queue_url` selects the shared variant: the engine uses
//! that queue and never creates or deletes it. Without it the engine owns a
//! queue it creates lazily and deletes on unsubscribe.

use crate::domain::{QueueHandle, FIFO_QUEUE_SUFFIX};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Default prefix of managed queue names.
pub const DEFAULT_ENVIRONMENT: &str = "local";

/// Who owns the backing queue's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueVariant {
    /// The engine creates the queue on first use and deletes it on unsubscribe.
    Managed,
    /// The engine borrows an existing queue.
    Shared,
}

/// Static credentials handed to a transport binding.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("has_session_token", &self.session_token.is_some())
            .finish()
    }
}

/// Transport client settings. The engine never interprets these; it only
/// carries them for the binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportConfig {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub credentials: Option<Credentials>,
    /// Binding-specific options.
    pub options: HashMap<String, String>,
}

impl TransportConfig {
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Configuration for a [`crate::QueuePubSub`] engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubConfig {
    /// Existing queue to use (shared variant).
    pub queue_url: Option<QueueHandle>,

    /// Delay between poll cycles.
    pub receive_message_timeout: Duration,

    /// Prefix of managed queue names.
    pub environment: String,

    /// Opaque settings for the transport binding.
    pub transport: TransportConfig,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            queue_url: None,
            receive_message_timeout: Duration::ZERO,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            transport: TransportConfig::default(),
        }
    }
}

impl PubSubConfig {
    /// Engine that owns its queue.
    #[must_use]
    pub fn managed() -> Self {
        Self::default()
    }

    /// Engine that borrows an existing queue.
    #[must_use]
    pub fn shared(queue_url: impl Into<QueueHandle>) -> Self {
        Self {
            queue_url: Some(queue_url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_receive_message_timeout(mut self, delay: Duration) -> Self {
        self.receive_message_timeout = delay;
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PUBSUB_QUEUE_URL`: Existing queue; selects the shared variant
    /// - `PUBSUB_RECEIVE_MESSAGE_TIMEOUT_MS`: Delay between poll cycles (default: 0)
    /// - `PUBSUB_ENV` or `APP_ENV`: Managed queue name prefix (default: local)
    /// - `AWS_REGION`: Transport region
    /// - `PUBSUB_ENDPOINT`: Transport endpoint override
    pub fn from_env() -> Self {
        Self {
            queue_url: env::var("PUBSUB_QUEUE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(QueueHandle::from),

            receive_message_timeout: env::var("PUBSUB_RECEIVE_MESSAGE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::ZERO),

            environment: env::var("PUBSUB_ENV")
                .or_else(|_| env::var("APP_ENV"))
                .unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string()),

            transport: TransportConfig {
                region: env::var("AWS_REGION").ok(),
                endpoint: env::var("PUBSUB_ENDPOINT").ok(),
                ..TransportConfig::default()
            },
        }
    }

    /// Which lifecycle variant this configuration selects.
    #[must_use]
    pub fn variant(&self) -> QueueVariant {
        if self.queue_url.is_some() {
            QueueVariant::Shared
        } else {
            QueueVariant::Managed
        }
    }

    /// Fresh, unique name for a managed ordered queue.
    #[must_use]
    pub fn managed_queue_name(&self) -> String {
        format!("{}-{}{}", self.environment, Uuid::new_v4(), FIFO_QUEUE_SUFFIX)
    }
}
