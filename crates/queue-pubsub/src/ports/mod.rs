//! Ports layer.
//!
//! - Inbound (Driving) ports: the engine capability used by stream adapters
//! - Outbound (Driven) ports: the queue transport binding

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
