//! Adapters layer.
//!
//! Transport bindings implementing [`crate::ports::QueueTransport`].

pub mod memory;

pub use memory::{InMemoryQueueTransport, DEDUPLICATION_WINDOW, DEFAULT_ENDPOINT};
