//! Concurrency accounting over per-component ledger queues.
//!
//! Each component owns a queue whose approximate depth stands in for its
//! live-worker count. A worker sends one empty message on entry and
//! removes one on exit; a crashed worker's message expires on queue
//! retention instead. The reading is therefore approximate: never
//! negative, and high by at most the crashes within the retention window.
//!
//! Retention on ledger queues must be at least the component's worker
//! timeout (the queue service floors retention at 60 s).

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::queue::QueueGateway;
use crate::resource_map::ResourceMap;
use crate::retry::with_retries;

/// Body of every ledger message.
const LEDGER_MESSAGE: &str = "{}";

/// Increment/decrement/read operations on component ledger queues.
#[derive(Debug, Clone)]
pub struct ConcurrencyLedger {
    queues: QueueGateway,
    map: Arc<ResourceMap>,
}

impl ConcurrencyLedger {
    /// Creates a ledger over the deployment's resource map.
    #[must_use]
    pub fn new(queues: QueueGateway, map: Arc<ResourceMap>) -> Self {
        Self { queues, map }
    }

    /// Records one live worker for `component`. Retried.
    ///
    /// # Errors
    ///
    /// Returns the last send error; callers log it and run anyway (the
    /// count just reads briefly low).
    pub async fn increment(&self, component: &str) -> Result<()> {
        let queue = self.map.ledger_queue(component)?;
        self.queues.send(queue, LEDGER_MESSAGE).await
    }

    /// Removes one live-worker record for `component`.
    ///
    /// Long-polls for up to `wait` with the given visibility window (must
    /// be strictly positive: a zero window re-exposes the message before
    /// the delete lands, which then fails silently). Receive and delete
    /// are each retried independently. Finding no message after the poll
    /// is a soft condition: logged, not an error.
    ///
    /// # Errors
    ///
    /// Returns the last receive or delete error once retries are
    /// exhausted.
    pub async fn decrement(&self, component: &str, wait: Duration, visibility: Duration) -> Result<()> {
        let queue = self.map.ledger_queue(component)?;
        let visibility = visibility.max(Duration::from_secs(1));

        let Some(message) = self.queues.receive_one(queue, visibility, wait).await? else {
            tracing::warn!(component, "no ledger message after long poll; count may read high");
            return Ok(());
        };
        with_retries("ledger delete", || {
            self.queues.delete(queue, &message.receipt)
        })
        .await
    }

    /// Returns the approximate live-worker count for `component`.
    ///
    /// # Errors
    ///
    /// Returns the last depth error once retries are exhausted.
    pub async fn reading(&self, component: &str) -> Result<u64> {
        let queue = self.map.ledger_queue(component)?;
        self.queues.approximate_depth(queue).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueueClient;
    use crate::resource_map::ledger_queue_key;

    fn ledger() -> ConcurrencyLedger {
        let mut map = ResourceMap::new();
        map.insert(ledger_queue_key("ingest"), "ingest-ledger");
        ConcurrencyLedger::new(
            QueueGateway::new(Arc::new(MemoryQueueClient::new())),
            Arc::new(map),
        )
    }

    #[tokio::test]
    async fn increment_then_decrement_balances() {
        let ledger = ledger();
        ledger.increment("ingest").await.expect("increment");
        ledger.increment("ingest").await.expect("increment");
        assert_eq!(ledger.reading("ingest").await.expect("reading"), 2);

        ledger
            .decrement("ingest", Duration::ZERO, Duration::from_secs(30))
            .await
            .expect("decrement");
        assert_eq!(ledger.reading("ingest").await.expect("reading"), 1);
    }

    #[tokio::test]
    async fn decrement_on_empty_ledger_is_soft() {
        let ledger = ledger();
        ledger
            .decrement("ingest", Duration::ZERO, Duration::from_secs(30))
            .await
            .expect("empty decrement should not error");
        assert_eq!(ledger.reading("ingest").await.expect("reading"), 0);
    }

    #[tokio::test]
    async fn unknown_component_is_a_configuration_error() {
        let ledger = ledger();
        let err = ledger.increment("ghost").await.expect_err("unknown component");
        assert!(err.to_string().contains("ghostLedgerQueue"));
    }
}
