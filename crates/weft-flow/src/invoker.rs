//! The invoker: a pure fan-out amplifier.
//!
//! A coordinator pass can only issue `maxInvocationCount` invocations
//! within its own time budget. Larger plans are split into bins, and each
//! bin is handed to one invoker invocation. An invoker runs the bin back
//! through the same splitter, so an oversized bin recursively amplifies
//! through further invokers until every count is dispatched directly.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use weft_core::config::{AppConfig, INVOKER_NAME};
use weft_core::invoke::FunctionInvoker;
use weft_core::ledger::ConcurrencyLedger;
use weft_core::observability::invoker_span;
use weft_core::paths::DeployPaths;
use weft_core::queue::QueueGateway;
use weft_core::resource_map::ResourceMap;
use weft_core::storage::StoreGateway;

use crate::context::LifecycleContext;
use crate::coordinator::{INTERNAL_LEDGER_WAIT, INTERNAL_VISIBILITY};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::plan::{split, InvocationCount};

/// The invoker's invocation payload: one bin of the plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokerEvent {
    /// Per-component invocation counts to issue.
    #[serde(default)]
    pub components: Vec<InvocationCount>,
}

impl InvokerEvent {
    /// Parses an event payload, tolerating a missing component list.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for structurally invalid payloads.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|err| weft_core::Error::serialization(err).into())
    }
}

/// One fan-out pass per invocation.
pub struct Invoker {
    config: Arc<AppConfig>,
    store: StoreGateway,
    queues: QueueGateway,
    invoker: Arc<dyn FunctionInvoker>,
    paths: DeployPaths,
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl Invoker {
    /// Creates the invoker for one deployment.
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
        }
    }

    /// Dispatches one bin and completes `ctx` exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error only when the resource map cannot be loaded.
    pub async fn handle(
        &self,
        event: InvokerEvent,
        ctx: Arc<dyn LifecycleContext>,
    ) -> Result<()> {
        let span = invoker_span(event.components.len());
        self.fan_out(event, ctx).instrument(span).await
    }

    async fn fan_out(&self, event: InvokerEvent, ctx: Arc<dyn LifecycleContext>) -> Result<()> {
        let map = match ResourceMap::load(&self.store, &self.paths).await {
            Ok(map) => Arc::new(map),
            Err(err) => {
                tracing::error!(error = %err, "resource map load failed");
                let fatal = Error::resource_map_unavailable(err);
                ctx.fail(fatal.to_string()).await;
                return Err(fatal);
            }
        };

        let ledger = ConcurrencyLedger::new(self.queues.clone(), Arc::clone(&map));
        let incremented = match ledger.increment(INVOKER_NAME).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "invoker ledger increment failed");
                false
            }
        };

        let counts = event.components;
        let plan = split(counts.clone(), self.config.coordinator.max_invocation_count);
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.config),
            Arc::clone(&map),
            Arc::clone(&self.invoker),
        );
        dispatcher.dispatch(&plan).await;

        if incremented {
            if let Err(err) = ledger
                .decrement(INVOKER_NAME, INTERNAL_LEDGER_WAIT, INTERNAL_VISIBILITY)
                .await
            {
                tracing::warn!(error = %err, "invoker ledger decrement failed");
            }
        }

        let components = serde_json::to_value(&counts).ok();
        ctx.done(None, components).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_defaults_to_empty_components() {
        let event = InvokerEvent::from_value(&serde_json::json!({})).expect("empty event");
        assert!(event.components.is_empty());

        let event = InvokerEvent::from_value(
            &serde_json::json!({"components": [{"name": "ingest", "count": 4}]}),
        )
        .expect("bin event");
        assert_eq!(event.components, vec![InvocationCount::new("ingest", 4)]);
    }
}
