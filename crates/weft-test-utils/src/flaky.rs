//! A queue decorator with scripted failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use weft_core::error::{Error, Result};
use weft_core::queue::{QueueClient, ReceivedMessage};

/// Queue operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueOp {
    /// `send`.
    Send,
    /// `receive_one`.
    Receive,
    /// `delete`.
    Delete,
    /// `approximate_depth`.
    Depth,
}

/// Wraps a [`QueueClient`] and fails scripted operations.
///
/// Each scripted failure is consumed once, so `fail_next(op, 2)` makes
/// the next two calls fail and the third reach the inner client, which
/// is exactly the shape retry tests need.
pub struct FlakyQueue {
    inner: Arc<dyn QueueClient>,
    failures: Mutex<HashMap<QueueOp, u32>>,
}

impl FlakyQueue {
    /// Wraps `inner` with no scripted failures.
    pub fn new(inner: Arc<dyn QueueClient>) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Scripts the next `count` calls of `op` to fail.
    pub fn fail_next(&self, op: QueueOp, count: u32) {
        *self
            .failures
            .lock()
            .expect("failures lock")
            .entry(op)
            .or_insert(0) += count;
    }

    fn should_fail(&self, op: QueueOp) -> bool {
        let mut failures = self.failures.lock().expect("failures lock");
        match failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn scripted_error(op: QueueOp) -> Error {
        Error::queue(format!("scripted {op:?} failure"))
    }
}

#[async_trait]
impl QueueClient for FlakyQueue {
    async fn send(&self, queue: &str, body: &str) -> Result<()> {
        if self.should_fail(QueueOp::Send) {
            return Err(Self::scripted_error(QueueOp::Send));
        }
        self.inner.send(queue, body).await
    }

    async fn receive_one(
        &self,
        queue: &str,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> Result<Option<ReceivedMessage>> {
        if self.should_fail(QueueOp::Receive) {
            return Err(Self::scripted_error(QueueOp::Receive));
        }
        self.inner.receive_one(queue, visibility_timeout, wait).await
    }

    async fn delete(&self, queue: &str, receipt: &str) -> Result<()> {
        if self.should_fail(QueueOp::Delete) {
            return Err(Self::scripted_error(QueueOp::Delete));
        }
        self.inner.delete(queue, receipt).await
    }

    async fn approximate_depth(&self, queue: &str) -> Result<u64> {
        if self.should_fail(QueueOp::Depth) {
            return Err(Self::scripted_error(QueueOp::Depth));
        }
        self.inner.approximate_depth(queue).await
    }
}
