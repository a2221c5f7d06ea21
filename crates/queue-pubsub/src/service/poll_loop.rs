//! # Poll Loop
//!
//! One cooperative task per subscription. Each cycle receives at most one
//! message, filters it, acknowledges it and only then dispatches it
//! (at-most-once: a crash inside the callback loses the message). The stop
//! flag is checked at cycle boundaries only, so a cycle already in flight
//! when stop is requested runs to completion.

use super::engine::EngineShared;
use crate::domain::{DeliveryFilter, PollError, SubscriptionId};
use crate::ports::{ErrorHandler, MessageHandler, ReceiveRequest};
use pubsub_telemetry::metrics::{self, outcome};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

/// Result of a successful poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    /// The queue returned nothing.
    Empty,
    /// A message for another trigger was left on the queue.
    Skipped,
    /// A matching message was acknowledged and dispatched.
    Delivered,
}

impl CycleOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::Empty => outcome::EMPTY,
            Self::Skipped => outcome::SKIPPED,
            Self::Delivered => outcome::DELIVERED,
        }
    }
}

pub(crate) struct PollLoop {
    shared: Arc<EngineShared>,
    subscription: SubscriptionId,
    filter: DeliveryFilter,
    request: ReceiveRequest,
    on_message: MessageHandler,
    on_error: Option<ErrorHandler>,
    delay: Duration,
    stop: watch::Receiver<bool>,
}

impl PollLoop {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        subscription: SubscriptionId,
        filter: DeliveryFilter,
        on_message: MessageHandler,
        on_error: Option<ErrorHandler>,
        delay: Duration,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let request = ReceiveRequest::single(filter.attribute_name());
        Self {
            shared,
            subscription,
            filter,
            request,
            on_message,
            on_error,
            delay,
            stop,
        }
    }

    /// A dropped sender counts as a stop request.
    fn stop_requested(&self) -> bool {
        *self.stop.borrow() || self.stop.has_changed().is_err()
    }

    /// Run cycles until stop is requested.
    pub(crate) async fn run(mut self) {
        metrics::ACTIVE_SUBSCRIPTIONS.inc();
        debug!(
            subscription = %self.subscription,
            trigger = %self.filter.trigger(),
            delay = ?self.delay,
            "Poll loop started"
        );

        loop {
            if self.stop_requested() {
                break;
            }

            match self.cycle().await {
                Ok(result) => metrics::record_poll_cycle(result.label()),
                Err(err) => self.report(&err),
            }

            if self.stop_requested() {
                break;
            }
            self.pause().await;
        }

        metrics::ACTIVE_SUBSCRIPTIONS.dec();
        debug!(
            subscription = %self.subscription,
            trigger = %self.filter.trigger(),
            "Poll loop stopped"
        );
    }

    /// Yield between cycles; a configured delay ends early on stop.
    async fn pause(&mut self) {
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
            return;
        }

        let delay = self.delay;
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = self.stop.changed() => {}
        }
    }

    /// One receive, filter, acknowledge, dispatch cycle.
    pub(crate) async fn cycle(&self) -> Result<CycleOutcome, PollError> {
        let queue = self.shared.ensure_queue().await?;

        let received = self
            .shared
            .transport
            .receive_message(&queue, &self.request)
            .await
            .map_err(PollError::Receive)?;

        let Some(envelope) = received else {
            return Ok(CycleOutcome::Empty);
        };

        if !self.filter.matches(&envelope) {
            trace!(
                subscription = %self.subscription,
                message_id = %envelope.message_id,
                "Message for another trigger left on queue"
            );
            return Ok(CycleOutcome::Skipped);
        }

        self.shared
            .transport
            .delete_message(&queue, &envelope.receipt)
            .await
            .map_err(|source| PollError::Delete {
                message_id: envelope.message_id.clone(),
                source,
            })?;

        let payload: serde_json::Value =
            serde_json::from_str(&envelope.body).map_err(|source| PollError::Decode {
                message_id: envelope.message_id.clone(),
                source,
            })?;

        let handler = &self.on_message;
        catch_unwind(AssertUnwindSafe(|| handler(payload))).map_err(|_| {
            PollError::HandlerPanicked {
                message_id: envelope.message_id.clone(),
            }
        })?;

        debug!(
            subscription = %self.subscription,
            trigger = %self.filter.trigger(),
            message_id = %envelope.message_id,
            "Message delivered"
        );
        Ok(CycleOutcome::Delivered)
    }

    fn report(&self, err: &PollError) {
        metrics::record_poll_error(err.kind());

        match err {
            PollError::Decode { .. } | PollError::HandlerPanicked { .. } => error!(
                subscription = %self.subscription,
                trigger = %self.filter.trigger(),
                error = %err,
                "Message dropped after acknowledgment"
            ),
            _ => warn!(
                subscription = %self.subscription,
                trigger = %self.filter.trigger(),
                kind = err.kind(),
                error = %err,
                "Poll cycle failed"
            ),
        }

        if let Some(hook) = &self.on_error {
            hook(err);
        }
    }
}
