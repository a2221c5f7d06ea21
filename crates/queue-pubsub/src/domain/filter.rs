//! # Delivery Filter
//!
//! Decides whether a received envelope belongs to the active trigger.
//! Matching is exact string equality on the routing attribute; there is no
//! wildcard or prefix matching. A non-matching envelope is left on the queue.

use super::entities::{Envelope, Trigger, TRIGGER_ATTRIBUTE};

/// Filter bound to one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFilter {
    trigger: Trigger,
}

impl DeliveryFilter {
    /// Create a filter for a single trigger.
    #[must_use]
    pub fn for_trigger(trigger: impl Into<Trigger>) -> Self {
        Self {
            trigger: trigger.into(),
        }
    }

    /// The trigger this filter accepts.
    #[must_use]
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Attribute the transport must return for [`Self::matches`] to work.
    #[must_use]
    pub fn attribute_name(&self) -> &'static str {
        TRIGGER_ATTRIBUTE
    }

    /// Check if an envelope matches this filter.
    #[must_use]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        envelope
            .string_attribute(TRIGGER_ATTRIBUTE)
            .is_some_and(|value| value == self.trigger.as_str())
    }
}
