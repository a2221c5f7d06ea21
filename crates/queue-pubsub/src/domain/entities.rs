//! # Domain Entities
//!
//! Identifiers and message shapes shared by the engine, the poll loop and
//! transport bindings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Message attribute carrying the trigger name of a published message.
pub const TRIGGER_ATTRIBUTE: &str = "SQSPubSubTriggerName";

/// Queue attribute marking a queue as ordered (first-in, first-out).
pub const FIFO_QUEUE_ATTRIBUTE: &str = "FifoQueue";

/// Name suffix required for ordered queues.
pub const FIFO_QUEUE_SUFFIX: &str = ".fifo";

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw string value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Unwrap into the raw string value.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&$name> for $name {
            fn from(value: &$name) -> Self {
                value.clone()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype!(
    /// Logical topic name used to route queue messages to a subscriber.
    Trigger
);

string_newtype!(
    /// Opaque identifier (usually a URL) of the backing queue.
    QueueHandle
);

string_newtype!(
    /// Transport-issued token that acknowledges (deletes) one received message.
    ReceiptToken
);

string_newtype!(
    /// Per-publish unique value that stops the transport collapsing identical
    /// payloads into one delivery.
    DeduplicationToken
);

impl DeduplicationToken {
    /// Fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Typed value of a message attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "data_type", content = "value")]
pub enum AttributeValue {
    String(String),
    Number(String),
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// The string payload, only for `String` attributes.
    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

/// Attribute bag attached to a message.
pub type MessageAttributes = HashMap<String, AttributeValue>;

/// Send-side envelope handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Textual (JSON) encoding of the payload.
    pub body: String,
    /// Ordering group; always the trigger name.
    pub group_id: String,
    /// Fresh per publish.
    pub deduplication_token: DeduplicationToken,
    pub attributes: MessageAttributes,
}

impl OutboundMessage {
    /// Build the envelope for one publish to `trigger`.
    #[must_use]
    pub fn for_trigger(trigger: &Trigger, body: String) -> Self {
        let mut attributes = MessageAttributes::new();
        attributes.insert(
            TRIGGER_ATTRIBUTE.to_string(),
            AttributeValue::String(trigger.as_str().to_string()),
        );

        Self {
            body,
            group_id: trigger.as_str().to_string(),
            deduplication_token: DeduplicationToken::generate(),
            attributes,
        }
    }
}

/// Receive-side envelope returned by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message_id: String,
    pub body: String,
    pub attributes: MessageAttributes,
    pub group_id: Option<String>,
    /// Valid for exactly one acknowledgment.
    pub receipt: ReceiptToken,
}

impl Envelope {
    /// String value of a named attribute, if present and string-typed.
    #[must_use]
    pub fn string_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttributeValue::as_string)
    }
}

/// Queue-level attributes passed on creation.
pub type QueueAttributes = HashMap<String, String>;

/// Attributes for an ordered queue.
#[must_use]
pub fn fifo_queue_attributes() -> QueueAttributes {
    let mut attributes = QueueAttributes::new();
    attributes.insert(FIFO_QUEUE_ATTRIBUTE.to_string(), "true".to_string());
    attributes
}

/// Identifier returned by `subscribe`, used only to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
