//! Lifecycle context wrapping for wrapped workers.
//!
//! The platform hands every invocation a lifecycle context with three
//! completion channels (`done(error, result)`, `fail(error)`, and
//! `succeed(result)`) plus a remaining-time query. The wrapper decorates
//! that context with guarded forwarders: the *first* completion call
//! records its mode and arguments and drives finalization; every later
//! call is silently ignored. First-writer-wins is what makes finalization
//! run exactly once even when a buggy handler completes twice or the
//! panic trap fires after a completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// The platform completion surface handed to an invocation.
#[async_trait]
pub trait LifecycleContext: Send + Sync {
    /// Completes with an optional error and an optional result.
    async fn done(&self, error: Option<String>, result: Option<Value>);

    /// Completes with an error.
    async fn fail(&self, error: String);

    /// Completes with an optional result.
    async fn succeed(&self, result: Option<Value>);

    /// Milliseconds left of the platform-provided time budget.
    fn millis_remaining(&self) -> u64;
}

/// The mode and arguments of the first completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// `done(error, result)`.
    Done {
        /// The handler's error, if any.
        error: Option<String>,
        /// The handler's result, if any.
        result: Option<Value>,
    },
    /// `fail(error)`.
    Fail {
        /// The handler's error.
        error: String,
    },
    /// `succeed(result)`.
    Succeed {
        /// The handler's result, if any.
        result: Option<Value>,
    },
}

impl Completion {
    /// Returns the completion's error, if the mode carries one.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Done { error, .. } => error.as_deref(),
            Self::Fail { error } => Some(error),
            Self::Succeed { .. } => None,
        }
    }

    /// Returns the completion's result, if the mode carries one.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Done { result, .. } | Self::Succeed { result } => result.as_ref(),
            Self::Fail { .. } => None,
        }
    }

    /// Returns true for succeed and for done without an error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            Self::Succeed { .. } => true,
            Self::Done { error, .. } => error.is_none(),
            Self::Fail { .. } => false,
        }
    }

    /// Returns the mode name, for logs and metrics.
    #[must_use]
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::Done { .. } => "done",
            Self::Fail { .. } => "fail",
            Self::Succeed { .. } => "succeed",
        }
    }
}

/// Finalization driven by the first completion call.
#[async_trait]
pub trait Finalize: Send + Sync {
    /// Runs the finalization pipeline and forwards to `inner`.
    async fn finalize(&self, completion: Completion, inner: &dyn LifecycleContext);
}

/// A lifecycle context whose completion channels fire at most once.
pub struct WrappedContext {
    inner: Arc<dyn LifecycleContext>,
    finalizer: Box<dyn Finalize>,
    fired: AtomicBool,
}

impl WrappedContext {
    /// Wraps `inner`, routing the first completion through `finalizer`.
    #[must_use]
    pub fn new(inner: Arc<dyn LifecycleContext>, finalizer: Box<dyn Finalize>) -> Self {
        Self {
            inner,
            finalizer,
            fired: AtomicBool::new(false),
        }
    }

    /// Returns true once a completion channel has fired.
    #[must_use]
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    async fn complete(&self, completion: Completion) {
        if self.fired.swap(true, Ordering::SeqCst) {
            tracing::debug!(mode = completion.mode(), "ignoring repeated completion");
            return;
        }
        self.finalizer.finalize(completion, self.inner.as_ref()).await;
    }
}

#[async_trait]
impl LifecycleContext for WrappedContext {
    async fn done(&self, error: Option<String>, result: Option<Value>) {
        self.complete(Completion::Done { error, result }).await;
    }

    async fn fail(&self, error: String) {
        self.complete(Completion::Fail { error }).await;
    }

    async fn succeed(&self, result: Option<Value>) {
        self.complete(Completion::Succeed { result }).await;
    }

    fn millis_remaining(&self) -> u64 {
        self.inner.millis_remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    struct NullContext;

    #[async_trait]
    impl LifecycleContext for NullContext {
        async fn done(&self, _error: Option<String>, _result: Option<Value>) {}
        async fn fail(&self, _error: String) {}
        async fn succeed(&self, _result: Option<Value>) {}
        fn millis_remaining(&self) -> u64 {
            120_000
        }
    }

    #[derive(Default)]
    struct CountingFinalizer {
        calls: AtomicU32,
        seen: Mutex<Option<Completion>>,
    }

    #[async_trait]
    impl Finalize for Arc<CountingFinalizer> {
        async fn finalize(&self, completion: Completion, _inner: &dyn LifecycleContext) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().expect("lock") = Some(completion);
        }
    }

    #[tokio::test]
    async fn first_completion_wins() {
        let finalizer = Arc::new(CountingFinalizer::default());
        let wrapped = WrappedContext::new(Arc::new(NullContext), Box::new(finalizer.clone()));

        wrapped.succeed(Some(json!({"x": 2}))).await;
        wrapped.fail("too late".into()).await;
        wrapped.done(None, None).await;

        assert_eq!(finalizer.calls.load(Ordering::SeqCst), 1);
        let seen = finalizer.seen.lock().expect("lock").clone();
        assert_eq!(
            seen,
            Some(Completion::Succeed {
                result: Some(json!({"x": 2}))
            })
        );
        assert!(wrapped.fired());
    }

    #[tokio::test]
    async fn time_remaining_passes_through() {
        let finalizer = Arc::new(CountingFinalizer::default());
        let wrapped = WrappedContext::new(Arc::new(NullContext), Box::new(finalizer));
        assert_eq!(wrapped.millis_remaining(), 120_000);
    }

    #[test]
    fn completion_modes() {
        assert!(Completion::Succeed { result: None }.is_success());
        assert!(Completion::Done {
            error: None,
            result: None
        }
        .is_success());
        assert!(!Completion::Done {
            error: Some("boom".into()),
            result: None
        }
        .is_success());
        assert!(!Completion::Fail {
            error: "boom".into()
        }
        .is_success());
        assert_eq!(Completion::Fail { error: "e".into() }.mode(), "fail");
    }
}
