//! # Queue Pub/Sub Engine
//!
//! Multiplexes logical triggers over one FIFO queue. Publishers tag each
//! message with the trigger attribute; the single active poll loop of an
//! engine leaves messages for other triggers on the queue for whichever
//! engine subscribed to them.
//!
//! ## Queue Variants
//!
//! - **Managed:** the queue `{environment}-{uuid}.fifo` is created lazily on
//!   first use and deleted by `unsubscribe`.
//! - **Shared:** an existing queue URL is used as-is and never deleted.

use super::poll_loop::PollLoop;
use super::stream::TriggerStream;
use crate::config::{PubSubConfig, QueueVariant};
use crate::domain::{
    fifo_queue_attributes, DeliveryFilter, OutboundMessage, ProvisionError, PublishError,
    QueueHandle, ReceiptToken, SubscribeError, SubscriptionId, TransportError,
    TransportOperation, Trigger,
};
use crate::ports::{MessageHandler, PubSubEngine, QueueTransport, SubscribeOptions};
use async_trait::async_trait;
use parking_lot::Mutex;
use pubsub_telemetry::{log_trigger_event, metrics};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// State shared between the engine and its poll loops.
pub(crate) struct EngineShared {
    pub(crate) transport: Arc<dyn QueueTransport>,
    pub(crate) config: PubSubConfig,
    /// Provisioning is serialized so concurrent first uses create one queue.
    queue: tokio::sync::Mutex<Option<QueueHandle>>,
}

impl EngineShared {
    pub(crate) fn new(transport: Arc<dyn QueueTransport>, config: PubSubConfig) -> Self {
        let queue = config.queue_url.clone();
        Self {
            transport,
            config,
            queue: tokio::sync::Mutex::new(queue),
        }
    }

    /// Return the queue handle, creating the managed queue if needed.
    pub(crate) async fn ensure_queue(&self) -> Result<QueueHandle, ProvisionError> {
        let mut queue = self.queue.lock().await;
        if let Some(handle) = queue.as_ref() {
            return Ok(handle.clone());
        }

        let name = self.config.managed_queue_name();
        let handle = self
            .transport
            .create_queue(&name, &fifo_queue_attributes())
            .await
            .map_err(|source| ProvisionError::Create {
                name: name.clone(),
                source,
            })?;

        metrics::QUEUES_PROVISIONED.inc();
        info!(queue = %handle, name = %name, "Managed queue created");
        *queue = Some(handle.clone());
        Ok(handle)
    }

    async fn current_queue(&self) -> Option<QueueHandle> {
        self.queue.lock().await.clone()
    }

    /// Delete the managed queue if one exists. Shared queues are left alone.
    ///
    /// The handle is kept when deletion fails so a retry can target it.
    async fn release_queue(&self) -> Result<(), ProvisionError> {
        let mut queue = self.queue.lock().await;
        self.release_locked(&mut queue).await
    }

    /// Delete the managed queue while the caller holds the queue lock.
    async fn release_locked(&self, queue: &mut Option<QueueHandle>) -> Result<(), ProvisionError> {
        if self.config.variant() == QueueVariant::Shared {
            return Ok(());
        }

        let Some(handle) = queue.clone() else {
            return Ok(());
        };

        self.transport
            .delete_queue(&handle)
            .await
            .map_err(|source| ProvisionError::Delete {
                queue: handle.clone(),
                source,
            })?;

        metrics::QUEUES_DELETED.inc();
        info!(queue = %handle, "Managed queue deleted");
        *queue = None;
        Ok(())
    }
}

struct ActiveLoop {
    id: SubscriptionId,
    trigger: Trigger,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    /// Replaced loops that were told to stop but may still be mid-cycle.
    retired: Vec<JoinHandle<()>>,
}

/// Trigger-routed publish/subscribe over a single ordered queue.
///
/// At most one poll loop runs per engine; subscribing again replaces it.
/// Dropping the engine stops the loop but does not delete a managed queue;
/// call [`QueuePubSub::unsubscribe`] for that.
pub struct QueuePubSub {
    shared: Arc<EngineShared>,
    active: Mutex<Option<ActiveLoop>>,
    next_subscription: AtomicU64,
}

impl QueuePubSub {
    /// Create an engine. No transport call is made until first use.
    pub fn new(transport: Arc<dyn QueueTransport>, config: PubSubConfig) -> Self {
        debug!(
            variant = ?config.variant(),
            environment = %config.environment,
            "Queue pub/sub engine created"
        );
        Self {
            shared: Arc::new(EngineShared::new(transport, config)),
            active: Mutex::new(None),
            next_subscription: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PubSubConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn variant(&self) -> QueueVariant {
        self.shared.config.variant()
    }

    /// The underlying transport, for operations the engine does not wrap.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn QueueTransport> {
        &self.shared.transport
    }

    /// The queue in use, if one is known yet.
    pub async fn queue_handle(&self) -> Option<QueueHandle> {
        self.shared.current_queue().await
    }

    #[must_use]
    pub fn active_trigger(&self) -> Option<Trigger> {
        self.active.lock().as_ref().map(|active| active.trigger.clone())
    }

    #[must_use]
    pub fn active_subscription(&self) -> Option<SubscriptionId> {
        self.active.lock().as_ref().map(|active| active.id)
    }

    /// Provision the queue now instead of on first publish or subscribe.
    pub async fn create_queue(&self) -> Result<QueueHandle, ProvisionError> {
        self.shared.ensure_queue().await
    }

    /// Delete the managed queue without touching the poll loop.
    ///
    /// A running loop will provision a fresh queue on its next cycle.
    pub async fn delete_queue(&self) -> Result<(), ProvisionError> {
        self.shared.release_queue().await
    }

    /// Acknowledge a message received directly through [`Self::transport`].
    pub async fn delete_message(&self, receipt: &ReceiptToken) -> Result<(), TransportError> {
        let Some(queue) = self.shared.current_queue().await else {
            return Err(TransportError::new(
                TransportOperation::DeleteMessage,
                "no queue provisioned",
            ));
        };
        self.shared.transport.delete_message(&queue, receipt).await
    }

    /// Publish `payload` as JSON under `trigger`.
    ///
    /// Encoding happens before any transport call, so an unencodable payload
    /// never provisions a queue.
    pub async fn publish<P>(
        &self,
        trigger: impl Into<Trigger>,
        payload: &P,
    ) -> Result<(), PublishError>
    where
        P: Serialize + ?Sized,
    {
        let trigger = trigger.into();
        let result = self.send(&trigger, payload).await;

        match &result {
            Ok(()) => {
                metrics::MESSAGES_PUBLISHED.inc();
                log_trigger_event!(debug, trigger, "Message published");
            }
            Err(err) => {
                metrics::PUBLISH_FAILURES.inc();
                log_trigger_event!(warn, trigger, "Publish failed", error = %err);
            }
        }
        result
    }

    async fn send<P>(&self, trigger: &Trigger, payload: &P) -> Result<(), PublishError>
    where
        P: Serialize + ?Sized,
    {
        let body = serde_json::to_string(payload)?;
        let queue = self.shared.ensure_queue().await?;
        self.shared
            .transport
            .send_message(&queue, OutboundMessage::for_trigger(trigger, body))
            .await
            .map_err(|source| PublishError::Send {
                trigger: trigger.clone(),
                source,
            })
    }

    /// Deliver payloads published under `trigger` to `on_message`.
    ///
    /// Replaces any loop already running on this engine.
    pub fn subscribe<F>(
        &self,
        trigger: impl Into<Trigger>,
        on_message: F,
    ) -> Result<SubscriptionId, SubscribeError>
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        self.subscribe_with(trigger, Arc::new(on_message), SubscribeOptions::default())
    }

    /// [`Self::subscribe`] with an explicit poll delay or error hook.
    pub fn subscribe_with(
        &self,
        trigger: impl Into<Trigger>,
        on_message: MessageHandler,
        options: SubscribeOptions,
    ) -> Result<SubscriptionId, SubscribeError> {
        let runtime = Handle::try_current().map_err(|_| SubscribeError::NoRuntime)?;
        let trigger = trigger.into();
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let delay = options
            .poll_delay
            .unwrap_or(self.shared.config.receive_message_timeout);

        let (stop, stop_rx) = watch::channel(false);
        let poll_loop = PollLoop::new(
            self.shared.clone(),
            id,
            DeliveryFilter::for_trigger(trigger.clone()),
            on_message,
            options.on_error,
            delay,
            stop_rx,
        );

        let mut active = self.active.lock();
        let mut retired = Vec::new();
        if let Some(previous) = active.take() {
            let _ = previous.stop.send(true);
            retired = previous.retired;
            retired.push(previous.task);
            retired.retain(|task| !task.is_finished());
            info!(
                replaced = %previous.id,
                previous_trigger = %previous.trigger,
                "Replacing active subscription"
            );
        }

        let task = runtime.spawn(poll_loop.run());
        info!(subscription = %id, trigger = %trigger, "Subscribed");
        *active = Some(ActiveLoop {
            id,
            trigger,
            stop,
            task,
            retired,
        });
        Ok(id)
    }

    /// Stop the loop started by `id` and delete a managed queue.
    ///
    /// Returns after the loop has exited, so no callback fires afterwards.
    /// The queue survives when another subscribe replaced the loop meanwhile.
    /// Ids that are not the active subscription succeed without effect.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ProvisionError> {
        let active = {
            let mut guard = self.active.lock();
            match guard.as_ref() {
                Some(active) if active.id == id => guard.take(),
                _ => None,
            }
        };

        let Some(active) = active else {
            debug!(subscription = %id, "Unsubscribe ignored; not the active subscription");
            return Ok(());
        };

        let _ = active.stop.send(true);
        for task in active.retired.into_iter().chain(std::iter::once(active.task)) {
            if let Err(err) = task.await {
                warn!(subscription = %id, error = %err, "Poll loop ended abnormally");
            }
        }
        info!(subscription = %id, trigger = %active.trigger, "Unsubscribed");

        // Loops and publishes of a concurrent subscribe wait on this lock,
        // so they provision a fresh queue after the deletion.
        let mut queue = self.shared.queue.lock().await;
        if let Some(current) = self.active_subscription() {
            debug!(
                subscription = %id,
                active = %current,
                "Managed queue kept; a newer subscription is active"
            );
            return Ok(());
        }
        self.shared.release_locked(&mut queue).await
    }

    /// Adapt a subscription into an async stream of payloads.
    pub async fn async_stream<I, T>(
        self: &Arc<Self>,
        triggers: I,
    ) -> Result<TriggerStream<Self>, SubscribeError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Trigger>,
    {
        TriggerStream::subscribe(self.clone(), triggers).await
    }
}

impl Drop for QueuePubSub {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            let _ = active.stop.send(true);
            debug!(subscription = %active.id, "Engine dropped; poll loop stopping");
        }
    }
}

#[async_trait]
impl PubSubEngine for QueuePubSub {
    async fn publish_value(
        &self,
        trigger: &Trigger,
        payload: serde_json::Value,
    ) -> Result<(), PublishError> {
        QueuePubSub::publish(self, trigger, &payload).await
    }

    async fn subscribe(
        &self,
        trigger: Trigger,
        on_message: MessageHandler,
        options: SubscribeOptions,
    ) -> Result<SubscriptionId, SubscribeError> {
        QueuePubSub::subscribe_with(self, trigger, on_message, options)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ProvisionError> {
        QueuePubSub::unsubscribe(self, id).await
    }
}
