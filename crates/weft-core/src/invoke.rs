//! Function invoker gateway: the platform's asynchronous invoke primitive.
//!
//! Every dispatch the control plane makes (worker fan-out, invoker
//! amplification, coordinator self-chaining, routed results) goes through
//! one seam: an event-style (fire-and-forget) invocation carrying a JSON
//! payload. The platform queues the event and retries delivery; the caller
//! only learns whether the invoke was accepted.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};

/// Backend trait for asynchronous function invocation.
#[async_trait]
pub trait FunctionInvoker: Send + Sync + 'static {
    /// Issues an event-style invocation of `function` with `payload`.
    ///
    /// Returns once the platform has accepted the event; the invocation
    /// itself runs asynchronously.
    async fn invoke_event(&self, function: &str, payload: &Value) -> Result<()>;
}

/// One invocation recorded by [`MemoryInvoker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvocation {
    /// The target function identifier.
    pub function: String,
    /// The JSON payload.
    pub payload: Value,
}

/// In-memory invoker for testing: records every accepted invocation.
///
/// Individual functions can be scripted to reject invocations, which is
/// how dispatch-failure paths are exercised.
#[derive(Debug, Default)]
pub struct MemoryInvoker {
    invocations: Mutex<Vec<RecordedInvocation>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryInvoker {
    /// Creates a new empty invoker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future invocation of `function` fail.
    pub fn fail_function(&self, function: impl Into<String>) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(function.into());
        }
    }

    /// Returns a snapshot of all recorded invocations, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations
            .lock()
            .map(|i| i.clone())
            .unwrap_or_default()
    }

    /// Returns how many invocations targeted `function`.
    #[must_use]
    pub fn count_for(&self, function: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|i| i.function == function)
            .count()
    }

    /// Removes and returns all recorded invocations.
    #[must_use]
    pub fn drain(&self) -> Vec<RecordedInvocation> {
        self.invocations
            .lock()
            .map(|mut i| std::mem::take(&mut *i))
            .unwrap_or_default()
    }
}

#[async_trait]
impl FunctionInvoker for MemoryInvoker {
    async fn invoke_event(&self, function: &str, payload: &Value) -> Result<()> {
        let failing = self
            .failing
            .lock()
            .map_err(|_| Error::internal("invoker lock poisoned"))?;
        if failing.contains(function) {
            return Err(Error::invocation(format!(
                "invoke of {function} rejected by test script"
            )));
        }
        drop(failing);

        self.invocations
            .lock()
            .map_err(|_| Error::internal("invoker lock poisoned"))?
            .push(RecordedInvocation {
                function: function.to_string(),
                payload: payload.clone(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_invocations_in_order() {
        let invoker = MemoryInvoker::new();
        invoker
            .invoke_event("fn-a", &json!({}))
            .await
            .expect("invoke should succeed");
        invoker
            .invoke_event("fn-b", &json!({"generation": 2}))
            .await
            .expect("invoke should succeed");

        let recorded = invoker.invocations();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].function, "fn-a");
        assert_eq!(recorded[1].payload, json!({"generation": 2}));
        assert_eq!(invoker.count_for("fn-a"), 1);
    }

    #[tokio::test]
    async fn scripted_failure_rejects_invoke() {
        let invoker = MemoryInvoker::new();
        invoker.fail_function("fn-a");

        let err = invoker
            .invoke_event("fn-a", &json!({}))
            .await
            .expect_err("scripted function should fail");
        assert!(err.to_string().contains("rejected"));
        assert!(invoker.invocations().is_empty());
    }
}
