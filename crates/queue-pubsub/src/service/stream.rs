//! # Trigger Streams
//!
//! Adapts the callback subscription of a [`PubSubEngine`] into an async
//! stream. Payloads are buffered in an unbounded channel; the stream ends
//! once the subscription is closed and the buffer is drained.

use super::engine::QueuePubSub;
use crate::domain::{ProvisionError, SubscribeError, SubscriptionId, Trigger};
use crate::ports::{MessageHandler, PubSubEngine, SubscribeOptions};
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::{debug, warn};

/// Async stream of payloads published under one trigger.
///
/// Dropping the stream unsubscribes in the background; use
/// [`TriggerStream::close`] to wait for it and observe errors.
pub struct TriggerStream<E: PubSubEngine + 'static = QueuePubSub> {
    engine: Arc<E>,
    trigger: Trigger,
    subscription: Option<SubscriptionId>,
    receiver: mpsc::UnboundedReceiver<serde_json::Value>,
}

impl<E: PubSubEngine + 'static> TriggerStream<E> {
    /// Subscribe `engine` to exactly one trigger.
    pub async fn subscribe<I, T>(engine: Arc<E>, triggers: I) -> Result<Self, SubscribeError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Trigger>,
    {
        Self::subscribe_with(engine, triggers, SubscribeOptions::default()).await
    }

    pub async fn subscribe_with<I, T>(
        engine: Arc<E>,
        triggers: I,
        options: SubscribeOptions,
    ) -> Result<Self, SubscribeError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Trigger>,
    {
        let mut triggers: Vec<Trigger> = triggers.into_iter().map(Into::into).collect();
        let trigger = match triggers.len() {
            0 => return Err(SubscribeError::NoTrigger),
            1 => triggers.remove(0),
            count => return Err(SubscribeError::MultipleTriggers { count }),
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        let handler: MessageHandler = Arc::new(move |payload| {
            // Receiver gone means the stream is closing
            let _ = sender.send(payload);
        });

        let id = engine.subscribe(trigger.clone(), handler, options).await?;
        debug!(subscription = %id, trigger = %trigger, "Trigger stream opened");

        Ok(Self {
            engine,
            trigger,
            subscription: Some(id),
            receiver,
        })
    }

    #[must_use]
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// `None` once the stream has been closed.
    #[must_use]
    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.subscription
    }

    /// Wait for the next payload.
    pub async fn next_payload(&mut self) -> Option<serde_json::Value> {
        self.receiver.recv().await
    }

    /// Wait for the next payload and decode it as `T`.
    pub async fn next_as<T: DeserializeOwned>(&mut self) -> Option<Result<T, serde_json::Error>> {
        let payload = self.receiver.recv().await?;
        Some(serde_json::from_value(payload))
    }

    /// Unsubscribe and wait for the poll loop to stop.
    pub async fn close(mut self) -> Result<(), ProvisionError> {
        self.receiver.close();
        match self.subscription.take() {
            Some(id) => {
                debug!(subscription = %id, trigger = %self.trigger, "Trigger stream closed");
                self.engine.unsubscribe(id).await
            }
            None => Ok(()),
        }
    }
}

impl<E: PubSubEngine + 'static> Stream for TriggerStream<E> {
    type Item = serde_json::Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl<E: PubSubEngine + 'static> Drop for TriggerStream<E> {
    fn drop(&mut self) {
        let Some(id) = self.subscription.take() else {
            return;
        };

        let Ok(runtime) = Handle::try_current() else {
            warn!(
                subscription = %id,
                "Trigger stream dropped outside a runtime; not unsubscribed"
            );
            return;
        };

        let engine = self.engine.clone();
        runtime.spawn(async move {
            if let Err(err) = engine.unsubscribe(id).await {
                warn!(subscription = %id, error = %err, "Background unsubscribe failed");
            }
        });
    }
}
