//! # Queue Pub/Sub - Trigger-Routed Messaging over One Ordered Queue
//!
//! Many logical channels ("triggers") share a single FIFO queue. Every
//! message carries its trigger as a string attribute; each engine runs one
//! poll loop that delivers only its own trigger and leaves everything else
//! on the queue.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  publish(trigger, payload)   ┌────────────────────┐
//! │  Publisher   │ ───────────────────────────▶ │                    │
//! └──────────────┘                              │   ordered queue    │
//!                                               │  (QueueTransport)  │
//! ┌──────────────┐  receive ▶ filter ▶ delete   │                    │
//! │  Poll loop   │ ◀─────────────────────────── │                    │
//! │  (1/engine)  │ ──▶ on_message(payload)      └────────────────────┘
//! └──────────────┘
//! ```
//!
//! ## Delivery Semantics
//!
//! - **At-most-once:** a matching message is deleted before its callback
//!   runs; a crash in the callback loses it.
//! - **No cross-trigger leaks:** a message whose trigger attribute differs
//!   is never deleted and never dispatched by this engine.
//! - **Bounded stop:** `unsubscribe` returns once the loop has exited.
//!
//! ## Layout
//!
//! - [`domain`]: triggers, envelopes, the delivery filter and error types
//! - [`ports`]: the [`QueueTransport`] seam and the [`PubSubEngine`] API
//! - [`adapters`]: the in-memory transport
//! - [`service`]: the engine, its poll loop and the stream adapter

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export main types
pub use adapters::InMemoryQueueTransport;
pub use config::{Credentials, PubSubConfig, QueueVariant, TransportConfig};
pub use domain::{
    DeliveryFilter, Envelope, PollError, ProvisionError, PubSubError, PubSubResult,
    PublishError, QueueHandle, SubscribeError, SubscriptionId, TransportError,
    TransportOperation, Trigger, TRIGGER_ATTRIBUTE,
};
pub use ports::{
    ErrorHandler, MessageHandler, PubSubEngine, QueueTransport, ReceiveRequest,
    SubscribeOptions,
};
pub use service::{QueuePubSub, TriggerStream};

/// Build an engine over the in-memory transport described by `config`.
#[must_use]
pub fn in_memory(config: PubSubConfig) -> QueuePubSub {
    let transport = InMemoryQueueTransport::from_config(&config.transport);
    QueuePubSub::new(std::sync::Arc::new(transport), config)
}
