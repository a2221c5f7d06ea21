//! In-memory queue transport.
//!
//! Models the queue behaviour the engine depends on: ordered groups,
//! visibility timeouts, single-use receipt tokens and deduplication of
//! repeated tokens. Used by tests and for running the engine without a
//! network service.

use crate::config::TransportConfig;
use crate::domain::{
    Envelope, MessageAttributes, OutboundMessage, QueueAttributes, QueueHandle, ReceiptToken,
    TransportError, TransportOperation, FIFO_QUEUE_ATTRIBUTE, FIFO_QUEUE_SUFFIX,
};
use crate::ports::{QueueTransport, ReceiveRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

/// Endpoint used when the transport config names none.
pub const DEFAULT_ENDPOINT: &str = "memory://local";

/// How long a deduplication token suppresses repeated sends on ordered queues.
pub const DEDUPLICATION_WINDOW: Duration = Duration::from_secs(300);

/// Attribute name requesting every message attribute.
const ALL_ATTRIBUTES: [&str; 2] = ["All", ".*"];

struct StoredMessage {
    message_id: String,
    body: String,
    attributes: MessageAttributes,
    group_id: String,
    visible_at: Instant,
    receipt: Option<ReceiptToken>,
}

struct MemoryQueue {
    fifo: bool,
    messages: VecDeque<StoredMessage>,
    seen_tokens: HashMap<String, Instant>,
    rotation: usize,
}

impl MemoryQueue {
    /// Indices of messages a receive may return right now.
    ///
    /// On ordered queues only the head of each group is eligible, and a
    /// hidden head blocks its whole group.
    fn receivable(&self, now: Instant) -> Vec<usize> {
        if !self.fifo {
            return self
                .messages
                .iter()
                .enumerate()
                .filter(|(_, m)| m.visible_at <= now)
                .map(|(i, _)| i)
                .collect();
        }

        let mut seen_groups = HashSet::new();
        let mut heads = Vec::new();
        for (index, message) in self.messages.iter().enumerate() {
            if !seen_groups.insert(message.group_id.as_str()) {
                continue;
            }
            if message.visible_at <= now {
                heads.push(index);
            }
        }
        heads
    }
}

#[derive(Default)]
struct TransportState {
    queues: HashMap<QueueHandle, MemoryQueue>,
    failures: HashMap<TransportOperation, VecDeque<String>>,
    calls: HashMap<TransportOperation, usize>,
}

impl TransportState {
    /// Count the call and pop an injected failure, if any.
    fn enter(&mut self, operation: TransportOperation) -> Result<(), TransportError> {
        *self.calls.entry(operation).or_insert(0) += 1;
        match self.failures.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(message) => Err(TransportError::new(operation, message)),
            None => Ok(()),
        }
    }

    fn queue_mut(
        &mut self,
        operation: TransportOperation,
        queue: &QueueHandle,
    ) -> Result<&mut MemoryQueue, TransportError> {
        self.queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::new(operation, format!("queue {queue} does not exist")))
    }
}

/// Queue transport held entirely in process memory.
pub struct InMemoryQueueTransport {
    endpoint: String,
    state: Mutex<TransportState>,
}

impl InMemoryQueueTransport {
    /// Create a transport with the default endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&TransportConfig::default())
    }

    /// Create a transport from client settings; only `endpoint` is used.
    #[must_use]
    pub fn from_config(config: &TransportConfig) -> Self {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            state: Mutex::new(TransportState::default()),
        }
    }

    /// Base of every queue handle issued by this transport.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Make the next call of `operation` fail with `message`.
    ///
    /// Repeated calls queue further failures.
    pub fn fail_next(&self, operation: TransportOperation, message: impl Into<String>) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(message.into());
    }

    /// Number of calls made to `operation`, failed ones included.
    #[must_use]
    pub fn calls(&self, operation: TransportOperation) -> usize {
        self.state.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Whether the queue currently exists.
    #[must_use]
    pub fn queue_exists(&self, queue: &QueueHandle) -> bool {
        self.state.lock().queues.contains_key(queue)
    }

    /// Messages stored in the queue, visible or not.
    #[must_use]
    pub fn queue_len(&self, queue: &QueueHandle) -> Option<usize> {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.messages.len())
    }

    /// Handles of all existing queues.
    #[must_use]
    pub fn queues(&self) -> Vec<QueueHandle> {
        let mut handles: Vec<_> = self.state.lock().queues.keys().cloned().collect();
        handles.sort();
        handles
    }
}

impl Default for InMemoryQueueTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueueTransport {
    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueHandle, TransportError> {
        let operation = TransportOperation::CreateQueue;
        let mut state = self.state.lock();
        state.enter(operation)?;

        let fifo = attributes
            .get(FIFO_QUEUE_ATTRIBUTE)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if fifo && !name.ends_with(FIFO_QUEUE_SUFFIX) {
            return Err(TransportError::new(
                operation,
                format!("ordered queue name {name} must end with {FIFO_QUEUE_SUFFIX}"),
            ));
        }

        let handle = QueueHandle::new(format!("{}/{}", self.endpoint, name));
        if let Some(existing) = state.queues.get(&handle) {
            if existing.fifo != fifo {
                return Err(TransportError::new(
                    operation,
                    format!("queue {name} already exists with different attributes"),
                ));
            }
            return Ok(handle);
        }

        state.queues.insert(
            handle.clone(),
            MemoryQueue {
                fifo,
                messages: VecDeque::new(),
                seen_tokens: HashMap::new(),
                rotation: 0,
            },
        );
        debug!(queue = %handle, fifo, "In-memory queue created");
        Ok(handle)
    }

    async fn delete_queue(&self, queue: &QueueHandle) -> Result<(), TransportError> {
        let operation = TransportOperation::DeleteQueue;
        let mut state = self.state.lock();
        state.enter(operation)?;

        match state.queues.remove(queue) {
            Some(_) => {
                debug!(queue = %queue, "In-memory queue deleted");
                Ok(())
            }
            None => Err(TransportError::new(
                operation,
                format!("queue {queue} does not exist"),
            )),
        }
    }

    async fn send_message(
        &self,
        queue: &QueueHandle,
        message: OutboundMessage,
    ) -> Result<(), TransportError> {
        let operation = TransportOperation::SendMessage;
        let now = Instant::now();
        let mut state = self.state.lock();
        state.enter(operation)?;
        let stored = state.queue_mut(operation, queue)?;

        if stored.fifo {
            stored
                .seen_tokens
                .retain(|_, sent_at| now.duration_since(*sent_at) < DEDUPLICATION_WINDOW);
            let token = message.deduplication_token.as_str().to_string();
            if stored.seen_tokens.contains_key(&token) {
                trace!(queue = %queue, token = %token, "Duplicate send suppressed");
                return Ok(());
            }
            stored.seen_tokens.insert(token, now);
        }

        stored.messages.push_back(StoredMessage {
            message_id: Uuid::new_v4().to_string(),
            body: message.body,
            attributes: message.attributes,
            group_id: message.group_id,
            visible_at: now,
            receipt: None,
        });
        Ok(())
    }

    async fn receive_message(
        &self,
        queue: &QueueHandle,
        request: &ReceiveRequest,
    ) -> Result<Option<Envelope>, TransportError> {
        let operation = TransportOperation::ReceiveMessage;
        let now = Instant::now();
        let mut state = self.state.lock();
        state.enter(operation)?;
        let stored = state.queue_mut(operation, queue)?;

        if request.max_messages == 0 {
            return Ok(None);
        }

        let candidates = stored.receivable(now);
        if candidates.is_empty() {
            return Ok(None);
        }
        let index = candidates[stored.rotation % candidates.len()];
        stored.rotation = stored.rotation.wrapping_add(1);

        let Some(message) = stored.messages.get_mut(index) else {
            return Ok(None);
        };
        let receipt = ReceiptToken::new(Uuid::new_v4().to_string());
        message.visible_at = now + request.visibility_timeout;
        message.receipt = Some(receipt.clone());

        let wants_all = request
            .attribute_names
            .iter()
            .any(|name| ALL_ATTRIBUTES.contains(&name.as_str()));
        let attributes = message
            .attributes
            .iter()
            .filter(|(name, _)| wants_all || request.attribute_names.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(Some(Envelope {
            message_id: message.message_id.clone(),
            body: message.body.clone(),
            attributes,
            group_id: Some(message.group_id.clone()),
            receipt,
        }))
    }

    async fn delete_message(
        &self,
        queue: &QueueHandle,
        receipt: &ReceiptToken,
    ) -> Result<(), TransportError> {
        let operation = TransportOperation::DeleteMessage;
        let mut state = self.state.lock();
        state.enter(operation)?;
        let stored = state.queue_mut(operation, queue)?;

        let position = stored
            .messages
            .iter()
            .position(|m| m.receipt.as_ref() == Some(receipt));
        match position {
            Some(index) => {
                stored.messages.remove(index);
                Ok(())
            }
            None => Err(TransportError::new(
                operation,
                format!("receipt {receipt} is not valid"),
            )),
        }
    }
}
