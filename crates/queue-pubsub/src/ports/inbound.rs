//! # Inbound Ports (Driving Ports / API)
//!
//! [`PubSubEngine`] is the capability set an async-sequence adapter needs:
//! publish, subscribe and unsubscribe. Implementations must fire the
//! callback at most once per accepted message and stop firing within one
//! cycle of `unsubscribe`.

use crate::domain::{
    PollError, ProvisionError, PublishError, SubscribeError, SubscriptionId, Trigger,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Callback receiving each accepted payload.
pub type MessageHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Hook receiving poll cycle errors.
pub type ErrorHandler = Arc<dyn Fn(&PollError) + Send + Sync>;

/// Per-subscription options.
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Overrides the engine's delay between poll cycles.
    pub poll_delay: Option<Duration>,
    /// Called with every poll cycle error, after it is logged.
    pub on_error: Option<ErrorHandler>,
}

impl SubscribeOptions {
    #[must_use]
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PollError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("poll_delay", &self.poll_delay)
            .field("has_error_handler", &self.on_error.is_some())
            .finish()
    }
}

/// Publish/subscribe capability over a trigger-routed queue.
#[async_trait]
pub trait PubSubEngine: Send + Sync {
    /// Publish an already-encoded JSON payload under `trigger`.
    async fn publish_value(
        &self,
        trigger: &Trigger,
        payload: serde_json::Value,
    ) -> Result<(), PublishError>;

    /// Start delivering payloads for `trigger` to `on_message`.
    async fn subscribe(
        &self,
        trigger: Trigger,
        on_message: MessageHandler,
        options: SubscribeOptions,
    ) -> Result<SubscriptionId, SubscribeError>;

    /// Stop the subscription. Unknown or repeated ids succeed without effect.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ProvisionError>;
}
