//! Closures as worker handlers.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use weft_flow::context::LifecycleContext;
use weft_flow::wrapper::Worker;

/// Adapts a closure into a [`Worker`].
///
/// ```rust,ignore
/// let worker = FnWorker::new(|event, ctx| async move {
///     ctx.succeed(Some(event)).await;
/// });
/// ```
pub struct FnWorker<F>(F);

impl<F, Fut> FnWorker<F>
where
    F: Fn(Value, Arc<dyn LifecycleContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Wraps `f` as a worker handler.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> Worker for FnWorker<F>
where
    F: Fn(Value, Arc<dyn LifecycleContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn run(&self, event: Value, ctx: Arc<dyn LifecycleContext>) {
        (self.0)(event, ctx).await;
    }
}
