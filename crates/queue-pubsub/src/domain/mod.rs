//! Domain layer: entities, errors and the delivery filter.

pub mod entities;
pub mod errors;
pub mod filter;

pub use entities::*;
pub use errors::*;
pub use filter::DeliveryFilter;
