//! Queue gateway: thin abstraction over a managed message queue.
//!
//! The contract matches managed-queue semantics: at-least-once delivery,
//! visibility timeouts on receive, deletion by receipt token, and an
//! eventually consistent approximate depth.
//!
//! [`QueueGateway`] layers the retry harness over a [`QueueClient`]
//! backend. Delete is deliberately *not* retried: a failed delete lets the
//! message reappear after its visibility window and be reprocessed, which
//! is the intended recovery path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::retry::with_retries;

/// A message handed out by [`QueueClient::receive_one`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// UTF-8 JSON message body.
    pub body: String,
    /// Receipt token used to delete the message.
    pub receipt: String,
}

/// Backend trait for the managed queue service.
///
/// Queues are addressed by opaque identifier strings (URLs in production,
/// plain names in the in-memory backend).
#[async_trait]
pub trait QueueClient: Send + Sync + 'static {
    /// Sends a message body to the queue.
    async fn send(&self, queue: &str, body: &str) -> Result<()>;

    /// Receives at most one message, long-polling for up to `wait`.
    ///
    /// A received message becomes invisible to other consumers for
    /// `visibility_timeout`. Returning `None` after the wait is not an
    /// error.
    async fn receive_one(
        &self,
        queue: &str,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>>;

    /// Deletes a message by its receipt token.
    async fn delete(&self, queue: &str, receipt: &str) -> Result<()>;

    /// Returns the approximate number of visible messages.
    async fn approximate_depth(&self, queue: &str) -> Result<u64>;
}

/// Retry-wrapped facade over a [`QueueClient`].
#[derive(Clone)]
pub struct QueueGateway {
    client: Arc<dyn QueueClient>,
}

impl std::fmt::Debug for QueueGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueGateway").finish_non_exhaustive()
    }
}

impl QueueGateway {
    /// Creates a gateway over the given backend.
    #[must_use]
    pub fn new(client: Arc<dyn QueueClient>) -> Self {
        Self { client }
    }

    /// Sends a message body. Retried.
    ///
    /// # Errors
    ///
    /// Returns the last send error once retries are exhausted.
    pub async fn send(&self, queue: &str, body: &str) -> Result<()> {
        with_retries("queue send", || self.client.send(queue, body)).await
    }

    /// Serializes `payload` as JSON and sends it. Retried.
    ///
    /// # Errors
    ///
    /// Returns a serialization error or the last send error.
    pub async fn send_json(&self, queue: &str, payload: &Value) -> Result<()> {
        let body = serde_json::to_string(payload).map_err(Error::serialization)?;
        self.send(queue, &body).await
    }

    /// Receives at most one message. Retried.
    ///
    /// # Errors
    ///
    /// Returns the last receive error once retries are exhausted.
    pub async fn receive_one(
        &self,
        queue: &str,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>> {
        with_retries("queue receive", || {
            self.client.receive_one(queue, visibility_timeout, wait)
        })
        .await
    }

    /// Deletes a message by receipt token. Not retried.
    ///
    /// # Errors
    ///
    /// Returns the delete error; the message reappears after its
    /// visibility window and is reprocessed.
    pub async fn delete(&self, queue: &str, receipt: &str) -> Result<()> {
        self.client.delete(queue, receipt).await
    }

    /// Returns the approximate visible depth. Retried.
    ///
    /// # Errors
    ///
    /// Returns the last depth error once retries are exhausted.
    pub async fn approximate_depth(&self, queue: &str) -> Result<u64> {
        with_retries("queue depth", || self.client.approximate_depth(queue)).await
    }
}

/// How often the in-memory backend re-checks a queue while long-polling.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
struct StoredMessage {
    body: String,
    visible_at: Instant,
    receipt: Option<String>,
}

/// In-memory queue backend for testing.
///
/// Reproduces the semantics the control plane depends on: visibility
/// timeouts, receipt tokens invalidated by redelivery, and a depth metric
/// that counts only visible messages.
#[derive(Debug, Default)]
pub struct MemoryQueueClient {
    queues: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl MemoryQueueClient {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_queues<T>(&self, f: impl FnOnce(&mut HashMap<String, Vec<StoredMessage>>) -> T) -> Result<T> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| Error::internal("queue lock poisoned"))?;
        Ok(f(&mut queues))
    }

    fn try_receive(
        &self,
        queue: &str,
        visibility_timeout: Duration,
        now: Instant,
    ) -> Result<Option<ReceivedMessage>> {
        self.with_queues(|queues| {
            let messages = queues.entry(queue.to_string()).or_default();
            let Some(message) = messages.iter_mut().find(|m| m.visible_at <= now) else {
                return None;
            };
            let receipt = Uuid::new_v4().to_string();
            message.visible_at = now + visibility_timeout;
            message.receipt = Some(receipt.clone());
            Some(ReceivedMessage {
                body: message.body.clone(),
                receipt,
            })
        })
    }
}

#[async_trait]
impl QueueClient for MemoryQueueClient {
    async fn send(&self, queue: &str, body: &str) -> Result<()> {
        let now = Instant::now();
        self.with_queues(|queues| {
            queues.entry(queue.to_string()).or_default().push(StoredMessage {
                body: body.to_string(),
                visible_at: now,
                receipt: None,
            });
        })
    }

    async fn receive_one(
        &self,
        queue: &str,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>> {
        let deadline = Instant::now() + wait;
        loop {
            let now = Instant::now();
            if let Some(message) = self.try_receive(queue, visibility_timeout, now)? {
                return Ok(Some(message));
            }
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn delete(&self, queue: &str, receipt: &str) -> Result<()> {
        self.with_queues(|queues| {
            let messages = queues.entry(queue.to_string()).or_default();
            let before = messages.len();
            messages.retain(|m| m.receipt.as_deref() != Some(receipt));
            if messages.len() == before {
                Err(Error::queue(format!(
                    "no message with receipt {receipt} in queue {queue}"
                )))
            } else {
                Ok(())
            }
        })?
    }

    async fn approximate_depth(&self, queue: &str) -> Result<u64> {
        let now = Instant::now();
        self.with_queues(|queues| {
            queues
                .get(queue)
                .map_or(0, |messages| {
                    messages.iter().filter(|m| m.visible_at <= now).count() as u64
                })
        })
    }
}
