//! Error types for the pub/sub engine.
//!
//! Publish and unsubscribe surface their errors to the caller. Poll loop
//! errors are reported through logs, metrics and the optional error hook,
//! and never stop the loop.

use super::entities::{QueueHandle, Trigger};
use std::fmt;
use thiserror::Error;

/// Transport primitive that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOperation {
    CreateQueue,
    DeleteQueue,
    SendMessage,
    ReceiveMessage,
    DeleteMessage,
}

impl TransportOperation {
    /// All operations, in declaration order.
    pub const ALL: [TransportOperation; 5] = [
        Self::CreateQueue,
        Self::DeleteQueue,
        Self::SendMessage,
        Self::ReceiveMessage,
        Self::DeleteMessage,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateQueue => "create_queue",
            Self::DeleteQueue => "delete_queue",
            Self::SendMessage => "send_message",
            Self::ReceiveMessage => "receive_message",
            Self::DeleteMessage => "delete_message",
        }
    }
}

impl fmt::Display for TransportOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a queue transport binding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct TransportError {
    pub operation: TransportOperation,
    pub message: String,
}

impl TransportError {
    pub fn new(operation: TransportOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Queue creation or deletion failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("failed to create queue {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to delete queue {queue}: {source}")]
    Delete {
        queue: QueueHandle,
        #[source]
        source: TransportError,
    },
}

/// A publish call failed; nothing was sent.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The payload has no JSON representation.
    #[error("payload encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("queue provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("send to trigger {trigger} failed: {source}")]
    Send {
        trigger: Trigger,
        #[source]
        source: TransportError,
    },
}

/// One poll cycle failed. The loop reports it and carries on.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("queue provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("receive failed: {0}")]
    Receive(#[source] TransportError),

    /// The message may be redelivered once its visibility window lapses.
    #[error("acknowledgment of message {message_id} failed: {source}")]
    Delete {
        message_id: String,
        #[source]
        source: TransportError,
    },

    /// The message was already acknowledged and is dropped.
    #[error("message {message_id} body is not valid JSON: {source}")]
    Decode {
        message_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("message handler panicked while processing message {message_id}")]
    HandlerPanicked { message_id: String },
}

impl PollError {
    /// Short label used for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provision(_) => "provision",
            Self::Receive(_) => "receive",
            Self::Delete { .. } => "delete",
            Self::Decode { .. } => "decode",
            Self::HandlerPanicked { .. } => "handler",
        }
    }
}

/// A subscription could not be set up.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    #[error("no trigger given")]
    NoTrigger,

    #[error("{count} triggers given; one engine serves a single trigger")]
    MultipleTriggers { count: usize },

    #[error("subscribe must be called from within a tokio runtime")]
    NoRuntime,
}

/// Umbrella error for callers that mix operations behind one `?`.
#[derive(Debug, Error)]
pub enum PubSubError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    #[error(transparent)]
    Poll(#[from] PollError),
}

/// Result type alias for engine operations.
pub type PubSubResult<T> = Result<T, PubSubError>;
