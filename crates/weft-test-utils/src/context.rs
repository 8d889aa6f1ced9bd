//! A lifecycle context that records completions for assertions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use weft_flow::context::{Completion, LifecycleContext};

/// Captures every completion call and answers a scripted time budget.
#[derive(Debug)]
pub struct RecordingContext {
    completions: Mutex<Vec<Completion>>,
    millis_remaining: AtomicU64,
}

impl Default for RecordingContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingContext {
    /// Creates a context with a two-minute time budget.
    pub fn new() -> Self {
        Self {
            completions: Mutex::new(Vec::new()),
            millis_remaining: AtomicU64::new(120_000),
        }
    }

    /// Creates a context with a specific time budget.
    pub fn with_millis_remaining(millis: u64) -> Self {
        let ctx = Self::new();
        ctx.set_millis_remaining(millis);
        ctx
    }

    /// Rewrites the scripted time budget.
    pub fn set_millis_remaining(&self, millis: u64) {
        self.millis_remaining.store(millis, Ordering::SeqCst);
    }

    /// Returns all recorded completions, in call order.
    pub fn completions(&self) -> Vec<Completion> {
        self.completions.lock().expect("completions lock").clone()
    }

    /// Returns the single recorded completion.
    ///
    /// Panics unless exactly one completion was recorded.
    pub fn single(&self) -> Completion {
        let completions = self.completions();
        assert_eq!(
            completions.len(),
            1,
            "expected exactly one completion, got {completions:?}"
        );
        completions.into_iter().next().expect("one completion")
    }

    /// Returns true when no completion has been recorded.
    pub fn is_empty(&self) -> bool {
        self.completions().is_empty()
    }

    fn record(&self, completion: Completion) {
        self.completions
            .lock()
            .expect("completions lock")
            .push(completion);
    }
}

#[async_trait]
impl LifecycleContext for RecordingContext {
    async fn done(&self, error: Option<String>, result: Option<Value>) {
        self.record(Completion::Done { error, result });
    }

    async fn fail(&self, error: String) {
        self.record(Completion::Fail { error });
    }

    async fn succeed(&self, result: Option<Value>) {
        self.record(Completion::Succeed { result });
    }

    fn millis_remaining(&self) -> u64 {
        self.millis_remaining.load(Ordering::SeqCst)
    }
}
