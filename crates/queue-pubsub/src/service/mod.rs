//! Engine services: the publish/subscribe engine, its poll loop and the
//! async stream adapter.

mod engine;
mod poll_loop;
mod stream;

pub use engine::QueuePubSub;
pub use stream::TriggerStream;
