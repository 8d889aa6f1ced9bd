//! The worker wrapper: the entry point installed around every user worker.
//!
//! The build step replaces a worker's entry point with this wrapper. Per
//! invocation it loads the resource map, brackets the concurrency ledger,
//! fetches the input event, runs the user handler under a last-resort
//! panic trap, and drives finalization exactly once: routing the result,
//! deleting the input message on success, decrementing the ledger, and
//! forwarding the outcome to the platform context.
//!
//! Finalization is fault-tolerant by construction: every sub-step runs
//! unconditionally and logs its own error. The aggregate outcome is the
//! first completion's, with one exception: a routing error upgrades a
//! successful outcome to `fail`, while an already-failing outcome keeps
//! its original error.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::Instrument;

use weft_core::config::{AppConfig, ComponentConfig, ComponentKind};
use weft_core::invoke::FunctionInvoker;
use weft_core::ledger::ConcurrencyLedger;
use weft_core::observability::worker_span;
use weft_core::paths::DeployPaths;
use weft_core::queue::QueueGateway;
use weft_core::resource_map::ResourceMap;
use weft_core::storage::StoreGateway;

use crate::context::{Completion, Finalize, LifecycleContext, WrappedContext};
use crate::error::{Error, Result};
use crate::metrics::FlowMetrics;
use crate::routing::{Routing, RoutingEngine, RoutingExpr};

/// A user-supplied worker handler.
///
/// Handlers complete through the lifecycle context's channels; returning
/// without completing leaves the invocation to the platform timeout, just
/// as an unwrapped worker would.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Processes one event.
    async fn run(&self, event: Value, ctx: Arc<dyn LifecycleContext>);
}

/// The wrapper installed around one component's worker.
pub struct WorkerWrapper {
    config: Arc<AppConfig>,
    component: ComponentConfig,
    handler: Arc<dyn Worker>,
    store: StoreGateway,
    queues: QueueGateway,
    invoker: Arc<dyn FunctionInvoker>,
    routing_expr: Option<RoutingExpr>,
    trap_panics: bool,
    paths: DeployPaths,
    metrics: FlowMetrics,
}

impl fmt::Debug for WorkerWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerWrapper")
            .field("component", &self.component.name)
            .finish_non_exhaustive()
    }
}

impl WorkerWrapper {
    /// Wraps `handler` as the entry point of `component_name`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the component is undefined or
    /// internal.
    pub fn new(
        config: Arc<AppConfig>,
        component_name: &str,
        handler: Arc<dyn Worker>,
        store: StoreGateway,
        queues: QueueGateway,
        invoker: Arc<dyn FunctionInvoker>,
    ) -> Result<Self> {
        let component = config
            .component(component_name)
            .ok_or_else(|| {
                weft_core::Error::configuration(format!(
                    "component '{component_name}' is not defined"
                ))
            })?
            .clone();
        if component.kind == ComponentKind::Internal {
            return Err(weft_core::Error::configuration(format!(
                "component '{component_name}' is internal and cannot be wrapped"
            ))
            .into());
        }

        let paths = config.deploy_paths();
        Ok(Self {
            config,
            component,
            handler,
            store,
            queues,
            invoker,
            routing_expr: None,
            trap_panics: true,
            paths,
            metrics: FlowMetrics::new(),
        })
    }

    /// Installs the component's compiled routing expression.
    #[must_use]
    pub fn with_routing_expr(mut self, expr: RoutingExpr) -> Self {
        self.routing_expr = Some(expr);
        self
    }

    /// Disables the last-resort panic trap.
    ///
    /// Tests that assert on panics need the panic to propagate.
    #[must_use]
    pub const fn with_panic_trap(mut self, enabled: bool) -> Self {
        self.trap_panics = enabled;
        self
    }

    /// Runs one invocation.
    ///
    /// `event` is the invocation payload: the routed payload for
    /// direct-invocation components, ignored for message-consuming
    /// components (they fetch their own input).
    ///
    /// # Errors
    ///
    /// Returns an error only when the resource map cannot be loaded;
    /// every other failure is routed through the wrapped context.
    pub async fn handle(&self, event: Option<Value>, ctx: Arc<dyn LifecycleContext>) -> Result<()> {
        let span = worker_span(&self.component.name);
        self.handle_inner(event, ctx).instrument(span).await
    }

    async fn handle_inner(
        &self,
        event: Option<Value>,
        ctx: Arc<dyn LifecycleContext>,
    ) -> Result<()> {
        // Without the resource map nothing else is safe to attempt; the
        // failure surfaces verbatim instead of through finalization.
        let map = Arc::new(
            ResourceMap::load(&self.store, &self.paths)
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "resource map load failed");
                    Error::resource_map_unavailable(err)
                })?,
        );

        let ledger = ConcurrencyLedger::new(self.queues.clone(), Arc::clone(&map));
        let incremented = match ledger.increment(&self.component.name).await {
            Ok(()) => true,
            Err(err) => {
                // The count reads briefly low; the worker still runs.
                tracing::warn!(error = %err, "ledger increment failed");
                false
            }
        };

        let receipt = Arc::new(Mutex::new(None));
        let finalizer = WrapperFinalizer {
            component: self.component.clone(),
            routing: Routing::from_parts(self.component.routing.as_ref(), self.routing_expr.clone()),
            engine: RoutingEngine::new(
                Arc::clone(&self.config),
                Arc::clone(&map),
                self.queues.clone(),
                Arc::clone(&self.invoker),
            ),
            queues: self.queues.clone(),
            ledger,
            map: Arc::clone(&map),
            receipt: Arc::clone(&receipt),
            incremented,
            metrics: self.metrics,
        };
        let wrapped: Arc<WrappedContext> = Arc::new(WrappedContext::new(ctx, Box::new(finalizer)));

        let event = match self.acquire_input(event, &map, &receipt, &wrapped).await {
            Some(event) => event,
            None => return Ok(()),
        };

        let handler = Arc::clone(&self.handler);
        let run = handler.run(event, wrapped.clone());
        if self.trap_panics {
            // Last resort: a panicking handler still reaches finalization.
            if let Err(panic) = std::panic::AssertUnwindSafe(run).catch_unwind().await {
                let message = panic_message(&panic);
                tracing::error!(error = %message, "worker handler panicked");
                wrapped.fail(message).await;
            }
        } else {
            run.await;
        }

        Ok(())
    }

    /// Produces the event for the user handler, or completes the wrapped
    /// context and returns `None` when no input is available.
    async fn acquire_input(
        &self,
        event: Option<Value>,
        map: &ResourceMap,
        receipt: &Arc<Mutex<Option<String>>>,
        wrapped: &Arc<WrappedContext>,
    ) -> Option<Value> {
        if self.component.kind == ComponentKind::FromInvocation {
            return Some(event.unwrap_or(Value::Null));
        }

        let queue = match map.input_queue(&self.component.name) {
            Ok(queue) => queue,
            Err(err) => {
                wrapped.fail(err.to_string()).await;
                return None;
            }
        };

        let received = match self
            .queues
            .receive_one(queue, self.component.visibility(), self.component.queue_wait())
            .await
        {
            Ok(received) => received,
            Err(err) => {
                wrapped.fail(err.to_string()).await;
                return None;
            }
        };

        let Some(message) = received else {
            wrapped.fail(Error::NoInputMessage.to_string()).await;
            return None;
        };

        if let Ok(mut slot) = receipt.lock() {
            *slot = Some(message.receipt);
        }

        match serde_json::from_str(&message.body) {
            Ok(event) => Some(event),
            Err(err) => {
                wrapped
                    .fail(format!("input message is not valid JSON: {err}"))
                    .await;
                None
            }
        }
    }
}

struct WrapperFinalizer {
    component: ComponentConfig,
    routing: Routing,
    engine: RoutingEngine,
    queues: QueueGateway,
    ledger: ConcurrencyLedger,
    map: Arc<ResourceMap>,
    receipt: Arc<Mutex<Option<String>>>,
    incremented: bool,
    metrics: FlowMetrics,
}

#[async_trait]
impl Finalize for WrapperFinalizer {
    async fn finalize(&self, completion: Completion, inner: &dyn LifecycleContext) {
        let name = self.component.name.as_str();
        self.metrics.record_completion(name, completion.mode());

        let routed = self
            .engine
            .route(&self.routing, completion.error(), completion.result())
            .await;
        if let Err(err) = &routed {
            tracing::warn!(component = name, error = %err, "result routing failed");
        }

        self.delete_input(&completion).await;
        self.decrement().await;

        // A routing error turns a successful outcome into a failure; a
        // failing outcome keeps its own error.
        match (routed, completion) {
            (Err(route_err), completion) if completion.is_success() => {
                inner.fail(route_err.to_string()).await;
            }
            (_, Completion::Done { error, result }) => inner.done(error, result).await,
            (_, Completion::Fail { error }) => inner.fail(error).await,
            (_, Completion::Succeed { result }) => inner.succeed(result).await,
        }
    }
}

impl WrapperFinalizer {
    async fn delete_input(&self, completion: &Completion) {
        if !completion.is_success() || !self.component.is_from_message() {
            return;
        }
        let Some(receipt) = self.receipt.lock().ok().and_then(|mut slot| slot.take()) else {
            return;
        };
        match self.map.input_queue(&self.component.name) {
            Ok(queue) => {
                if let Err(err) = self.queues.delete(queue, &receipt).await {
                    tracing::warn!(
                        component = %self.component.name,
                        error = %err,
                        "input delete failed; message will reappear"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(component = %self.component.name, error = %err, "input delete skipped");
            }
        }
    }

    async fn decrement(&self) {
        if !self.incremented {
            return;
        }
        if let Err(err) = self
            .ledger
            .decrement(
                &self.component.name,
                self.component.queue_wait(),
                self.component.visibility(),
            )
            .await
        {
            tracing::warn!(component = %self.component.name, error = %err, "ledger decrement failed");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    eprintln!("DEBUG is_str = {}", panic.is::<&str>());
    eprintln!("DEBUG is_string = {}", panic.is::<String>());
    eprintln!("DEBUG is_box_str = {}", panic.is::<Box<str>>());
    eprintln!("DEBUG is_arc_str = {}", panic.is::<std::sync::Arc<str>>());
    eprintln!("DEBUG is_boxed_dyn_error = {}", panic.is::<Box<dyn std::error::Error + Send + Sync>>());
    eprintln!("DEBUG is_anyhow = {}", panic.is::<&'static str>());
    eprintln!("DEBUG is_cow = {}", panic.is::<std::borrow::Cow<'static, str>>());
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker handler panicked".to_string()
    }
}

#[cfg(test)]
mod panic_repro {
    use super::*;

    #[tokio::test]
    async fn repro() {
        let worker: Arc<dyn Worker> = Arc::new(weft_test_utils::FnWorker::new(|_e, _c| async move {
            panic!("boom in user code");
        }));
        let run = worker.run(Value::Null, Arc::new(NullCtx));
        if let Err(panic) = std::panic::AssertUnwindSafe(run).catch_unwind().await {
            eprintln!("REPRO is_str={}", panic.is::<&str>());
        }
    }

    struct TestW;
    #[async_trait]
    impl Worker for TestW {
        async fn run(&self, _event: Value, _ctx: Arc<dyn crate::context::LifecycleContext>) {
            panic!("boom in user code");
        }
    }

    struct NullCtx;
    #[async_trait]
    impl crate::context::LifecycleContext for NullCtx {
        async fn done(&self, _error: Option<String>, _result: Option<Value>) {}
        async fn fail(&self, _error: String) {}
        async fn succeed(&self, _result: Option<Value>) {}
        fn millis_remaining(&self) -> u64 { 0 }
    }
}
