//! Plan execution: turning an invocation plan into platform invokes.
//!
//! Local counts become direct event-style invocations of the component
//! worker functions with an empty payload; message-consuming workers
//! fetch their own input. Remote bins each become one invocation of the
//! invoker function carrying the bin. In-flight API calls are capped at
//! `maxApiConcurrency`; individual failures are logged and counted but
//! never short-circuit the remaining dispatches.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

use weft_core::config::{AppConfig, INVOKER_NAME};
use weft_core::invoke::FunctionInvoker;
use weft_core::resource_map::ResourceMap;

use crate::metrics::FlowMetrics;
use crate::plan::InvocationPlan;

/// Dispatch kind label for direct worker invokes.
pub const KIND_WORKER: &str = "worker";
/// Dispatch kind label for invoker bin invokes.
pub const KIND_INVOKER: &str = "invoker";

/// Outcome tally of one plan dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Invocations the platform accepted.
    pub issued: usize,
    /// Invocations that failed (already logged).
    pub failed: usize,
}

/// Executes invocation plans against the platform.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<AppConfig>,
    map: Arc<ResourceMap>,
    invoker: Arc<dyn FunctionInvoker>,
    metrics: FlowMetrics,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher over the deployment's invoke gateway.
    #[must_use]
    pub fn new(
        config: Arc<AppConfig>,
        map: Arc<ResourceMap>,
        invoker: Arc<dyn FunctionInvoker>,
    ) -> Self {
        Self {
            config,
            map,
            invoker,
            metrics: FlowMetrics::new(),
        }
    }

    /// Issues every invocation in `plan`.
    ///
    /// Failures are logged and tallied; the remaining invocations always
    /// run.
    pub async fn dispatch(&self, plan: &InvocationPlan) -> DispatchSummary {
        let mut calls: Vec<(&str, String, Value)> = Vec::new();

        for count in &plan.local {
            match self.map.function(&count.name) {
                Ok(function) => {
                    for _ in 0..count.count {
                        calls.push((KIND_WORKER, function.to_string(), json!({})));
                    }
                }
                Err(err) => {
                    tracing::warn!(component = %count.name, error = %err, "cannot resolve worker function");
                    self.metrics.record_dispatch(KIND_WORKER, "failed");
                }
            }
        }

        match self.map.function(INVOKER_NAME) {
            Ok(function) => {
                for bin in &plan.remote {
                    calls.push((KIND_INVOKER, function.to_string(), json!({"components": bin})));
                }
            }
            Err(err) => {
                if !plan.remote.is_empty() {
                    tracing::warn!(error = %err, "cannot resolve invoker function");
                    self.metrics.record_dispatch(KIND_INVOKER, "failed");
                }
            }
        }

        let results = stream::iter(calls)
            .map(|(kind, function, payload)| {
                let invoker = Arc::clone(&self.invoker);
                async move {
                    let outcome = invoker.invoke_event(&function, &payload).await;
                    (kind, function, outcome)
                }
            })
            .buffer_unordered(self.config.coordinator.max_api_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut summary = DispatchSummary::default();
        for (kind, function, outcome) in results {
            match outcome {
                Ok(()) => {
                    summary.issued += 1;
                    self.metrics.record_dispatch(kind, "ok");
                }
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(kind, function = %function, error = %err, "dispatch failed");
                    self.metrics.record_dispatch(kind, "failed");
                }
            }
        }

        if summary.issued + summary.failed > 0 {
            tracing::info!(
                issued = summary.issued,
                failed = summary.failed,
                "plan dispatched"
            );
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::InvocationCount;
    use weft_core::invoke::MemoryInvoker;
    use weft_core::resource_map::function_key;

    fn fixture() -> (Dispatcher, Arc<MemoryInvoker>) {
        let config = Arc::new(
            AppConfig::from_json(
                r#"{
                    "name": "pipeline",
                    "version": "1",
                    "deployId": 1,
                    "deployment": {"region": "us-east-1", "s3Bucket": "b", "s3KeyPrefix": "p"},
                    "coordinator": {
                        "coordinatorConcurrency": 1,
                        "maxApiConcurrency": 4,
                        "maxInvocationCount": 10,
                        "minInterval": 10
                    },
                    "roles": [{"name": "worker"}],
                    "components": [{
                        "name": "ingest",
                        "kind": "fromMessage",
                        "worker": {"handler": "h", "memory": 256, "timeout": 30, "role": "worker"},
                        "maxConcurrency": 10,
                        "queueWaitSeconds": 0
                    }]
                }"#,
            )
            .expect("fixture should parse"),
        );

        let mut map = ResourceMap::new();
        map.insert(function_key("ingest"), "fn-ingest");
        map.insert(function_key(INVOKER_NAME), "fn-invoker");

        let invoker = Arc::new(MemoryInvoker::new());
        let dispatcher = Dispatcher::new(config, Arc::new(map), invoker.clone());
        (dispatcher, invoker)
    }

    #[tokio::test]
    async fn local_counts_become_direct_invokes() {
        let (dispatcher, invoker) = fixture();
        let plan = InvocationPlan {
            local: vec![InvocationCount::new("ingest", 3)],
            remote: Vec::new(),
        };

        let summary = dispatcher.dispatch(&plan).await;
        assert_eq!(summary, DispatchSummary { issued: 3, failed: 0 });
        assert_eq!(invoker.count_for("fn-ingest"), 3);
        for invocation in invoker.invocations() {
            assert_eq!(invocation.payload, json!({}));
        }
    }

    #[tokio::test]
    async fn remote_bins_invoke_the_invoker() {
        let (dispatcher, invoker) = fixture();
        let bin = vec![InvocationCount::new("ingest", 5)];
        let plan = InvocationPlan {
            local: Vec::new(),
            remote: vec![bin.clone()],
        };

        dispatcher.dispatch(&plan).await;
        let recorded = invoker.invocations();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].function, "fn-invoker");
        assert_eq!(recorded[0].payload, json!({"components": bin}));
    }

    #[tokio::test]
    async fn failures_do_not_short_circuit() {
        let (dispatcher, invoker) = fixture();
        invoker.fail_function("fn-invoker");
        let plan = InvocationPlan {
            local: vec![InvocationCount::new("ingest", 2)],
            remote: vec![vec![InvocationCount::new("ingest", 5)]],
        };

        let summary = dispatcher.dispatch(&plan).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.issued, 2);
        assert_eq!(invoker.count_for("fn-ingest"), 2);
    }
}
