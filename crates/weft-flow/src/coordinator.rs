//! The coordinator: a control loop built from ephemeral invocations.
//!
//! One coordinator invocation runs a single pass (measure, plan,
//! dispatch, sleep to the configured interval, chain the next invocation)
//! and then exits. The chain of passes forms a continuously running
//! controller with no dedicated server underneath it.
//!
//! Only the resource map load short-circuits a pass. Every later step
//! runs regardless of earlier failures, the first-seen error is reported
//! through the lifecycle context, and the chain is always attempted: a
//! half-broken pass that still chains is recoverable, a pass that fails
//! to chain terminates the application.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use weft_core::config::{AppConfig, COORDINATOR_NAME};
use weft_core::invoke::FunctionInvoker;
use weft_core::ledger::ConcurrencyLedger;
use weft_core::observability::coordinator_span;
use weft_core::paths::DeployPaths;
use weft_core::queue::QueueGateway;
use weft_core::resource_map::ResourceMap;
use weft_core::storage::StoreGateway;

use crate::context::LifecycleContext;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::handshake;
use crate::metrics::FlowMetrics;
use crate::plan;
use crate::status::{self, ApplicationStatus};

/// Tail of the platform time budget the pass never sleeps into.
pub const DEADLINE_RESERVE: Duration = Duration::from_secs(5);

/// Ledger message visibility for the internal components. The
/// provisioner gives coordinator and invoker functions the maximum
/// worker timeout, and visibility must match it.
pub(crate) const INTERNAL_VISIBILITY: Duration = Duration::from_secs(300);

/// Ledger long-poll for the internal components.
pub(crate) const INTERNAL_LEDGER_WAIT: Duration = Duration::from_secs(1);

/// The self-chained coordinator event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorEvent {
    /// Chain generation; absent on seed invocations.
    #[serde(default)]
    pub generation: u64,
}

impl CoordinatorEvent {
    /// Parses an event payload, tolerating missing fields.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for structurally invalid payloads.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|err| weft_core::Error::serialization(err).into())
    }
}

/// One coordinator pass per invocation; self-chains to form the loop.
pub struct Coordinator {
    config: Arc<AppConfig>,
    store: StoreGateway,
    queues: QueueGateway,
    invoker: Arc<dyn FunctionInvoker>,
    paths: DeployPaths,
    metrics: FlowMetrics,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Creates the coordinator for one deployment.
    #[must_use]
    pub fn new(
        config: Arc<AppConfig>,
        store: StoreGateway,
        queues: QueueGateway,
        invoker: Arc<dyn FunctionInvoker>,
    ) -> Self {
        let paths = config.deploy_paths();
        Self {
            config,
            store,
            queues,
            invoker,
            paths,
            metrics: FlowMetrics::new(),
        }
    }

    /// Runs one pass for `event` and completes `ctx` exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error only when the resource map cannot be loaded,
    /// the one failure that aborts the chain.
    pub async fn handle(
        &self,
        event: CoordinatorEvent,
        ctx: Arc<dyn LifecycleContext>,
    ) -> Result<ApplicationStatus> {
        let generation = event.generation + 1;
        let span = coordinator_span(generation);
        self.pass(event, generation, ctx).instrument(span).await
    }

    async fn pass(
        &self,
        event: CoordinatorEvent,
        generation: u64,
        ctx: Arc<dyn LifecycleContext>,
    ) -> Result<ApplicationStatus> {
        let started = tokio::time::Instant::now();
        let mut first_error: Option<Error> = None;

        // Step 1: the only short-circuit in the pass.
        let map = match ResourceMap::load(&self.store, &self.paths).await {
            Ok(map) => Arc::new(map),
            Err(err) => {
                tracing::error!(error = %err, "resource map load failed; chain ends here");
                self.metrics
                    .record_coordinator_pass("failed", started.elapsed());
                let fatal = Error::resource_map_unavailable(err);
                ctx.fail(fatal.to_string()).await;
                return Err(fatal);
            }
        };
        let ledger = ConcurrencyLedger::new(self.queues.clone(), Arc::clone(&map));

        // Step 2: failure is recorded, not short-circuiting.
        let incremented = match ledger.increment(COORDINATOR_NAME).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "coordinator ledger increment failed");
                first_error.get_or_insert(err.into());
                false
            }
        };

        // Step 3.
        let status = status::measure(&self.config, &map, &self.queues, &ledger).await;
        self.publish_status_gauges(&status);

        // Step 4: seed invocations all start at generation 1 together, so
        // they must not see each other as missing and over-spawn.
        if generation != 1 {
            self.ensure_redundancy(&event, &map, &status).await;
        }

        // Step 5.
        let plan = plan::plan(&self.config, &status);
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.config),
            Arc::clone(&map),
            Arc::clone(&self.invoker),
        );
        dispatcher.dispatch(&plan).await;

        // Step 6.
        self.sleep_to_interval(started, ctx.as_ref()).await;

        // Step 7.
        if incremented {
            if let Err(err) = ledger
                .decrement(COORDINATOR_NAME, INTERNAL_LEDGER_WAIT, INTERNAL_VISIBILITY)
                .await
            {
                tracing::warn!(error = %err, "coordinator ledger decrement failed");
                first_error.get_or_insert(err.into());
            }
        }

        // Step 8: the chain is always attempted.
        let next = CoordinatorEvent { generation };
        if let Err(err) = self.invoke_coordinator(&map, &next).await {
            tracing::error!(error = %err, "chain invocation failed");
            self.metrics.record_chain_failure();
            first_error.get_or_insert(Error::chain_failed(err));
        }

        if generation == 1 && first_error.is_none() {
            if let Err(err) = handshake::confirm(&self.store, &self.paths).await {
                tracing::error!(error = %err, "confirmation write failed");
                first_error.get_or_insert(err);
            }
        }

        let outcome = if first_error.is_some() { "failed" } else { "ok" };
        self.metrics
            .record_coordinator_pass(outcome, started.elapsed());

        let status_value = serde_json::to_value(&status).ok();
        ctx.done(first_error.map(|err| err.to_string()), status_value)
            .await;
        Ok(status)
    }

    /// Keeps the coordinator fleet at its configured size by issuing
    /// replacement invocations carrying the *incoming* event, so each
    /// replacement increments to this pass's generation.
    async fn ensure_redundancy(
        &self,
        event: &CoordinatorEvent,
        map: &ResourceMap,
        status: &ApplicationStatus,
    ) {
        let target = u64::from(self.config.coordinator.coordinator_concurrency);
        let Some(observed) = status.coordinator_concurrency() else {
            return;
        };
        if observed >= target {
            return;
        }

        tracing::info!(observed, target, "restoring coordinator redundancy");
        for _ in observed..target {
            if let Err(err) = self.invoke_coordinator(map, event).await {
                tracing::warn!(error = %err, "redundancy invocation failed");
                self.metrics.record_dispatch("redundancy", "failed");
            } else {
                self.metrics.record_dispatch("redundancy", "ok");
            }
        }
    }

    async fn invoke_coordinator(
        &self,
        map: &ResourceMap,
        event: &CoordinatorEvent,
    ) -> weft_core::Result<()> {
        let function = map.function(COORDINATOR_NAME)?;
        let payload = serde_json::to_value(event).map_err(weft_core::Error::serialization)?;
        self.invoker.invoke_event(function, &payload).await
    }

    /// Sleeps out the remainder of the pass interval, never into the
    /// reserved tail of the platform time budget.
    async fn sleep_to_interval(&self, started: tokio::time::Instant, ctx: &dyn LifecycleContext) {
        let elapsed = started.elapsed();
        let wanted = self.config.coordinator.interval().saturating_sub(elapsed);
        let budget = Duration::from_millis(ctx.millis_remaining()).saturating_sub(DEADLINE_RESERVE);
        let pause = wanted.min(budget);
        if !pause.is_zero() {
            tracing::debug!(pause_ms = pause.as_millis() as u64, "sleeping to interval");
            tokio::time::sleep(pause).await;
        }
    }

    fn publish_status_gauges(&self, status: &ApplicationStatus) {
        for (name, component) in &status.components {
            if let Some(concurrency) = component.concurrency {
                self.metrics.set_component_concurrency(name, concurrency);
            }
            if let Some(backlog) = component.queued_messages {
                self.metrics.set_component_backlog(name, backlog);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_defaults_to_zero() {
        let event = CoordinatorEvent::from_value(&serde_json::json!({})).expect("empty event");
        assert_eq!(event.generation, 0);

        let event = CoordinatorEvent::from_value(&serde_json::json!({"generation": 4}))
            .expect("explicit generation");
        assert_eq!(event.generation, 4);
    }
}
