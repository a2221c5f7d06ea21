//! Outbound (Driven) ports for the engine.
//!
//! [`QueueTransport`] is the binding to the actual message queue service.
//! Bindings own authentication, retries and network handling; the engine
//! only sees typed [`TransportError`]s.

use crate::domain::{
    Envelope, OutboundMessage, QueueAttributes, QueueHandle, ReceiptToken, TransportError,
};
use async_trait::async_trait;
use std::time::Duration;

/// Parameters of a single receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Upper bound on returned messages. The engine always asks for one.
    pub max_messages: u32,
    /// Message attributes the transport must include in the envelope.
    pub attribute_names: Vec<String>,
    /// How long a received message stays hidden from other receivers.
    pub visibility_timeout: Duration,
}

impl ReceiveRequest {
    /// One message, the given attribute, immediately visible again if not deleted.
    #[must_use]
    pub fn single(attribute_name: impl Into<String>) -> Self {
        Self {
            max_messages: 1,
            attribute_names: vec![attribute_name.into()],
            visibility_timeout: Duration::ZERO,
        }
    }
}

/// Queue transport binding.
///
/// All calls are asynchronous suspension points and may fail with a
/// transport-defined error.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Create a queue and return its handle.
    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueHandle, TransportError>;

    /// Delete a queue and every message in it.
    async fn delete_queue(&self, queue: &QueueHandle) -> Result<(), TransportError>;

    /// Send one message.
    async fn send_message(
        &self,
        queue: &QueueHandle,
        message: OutboundMessage,
    ) -> Result<(), TransportError>;

    /// Receive at most one message.
    async fn receive_message(
        &self,
        queue: &QueueHandle,
        request: &ReceiveRequest,
    ) -> Result<Option<Envelope>, TransportError>;

    /// Acknowledge (delete) a received message.
    async fn delete_message(
        &self,
        queue: &QueueHandle,
        receipt: &ReceiptToken,
    ) -> Result<(), TransportError>;
}
