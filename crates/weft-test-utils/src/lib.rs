//! Shared test utilities for Weft integration tests.
//!
//! This crate provides:
//! - [`RecordingContext`]: a lifecycle context that captures completions
//! - [`FlakyQueue`]: a queue decorator with scripted failures
//! - [`FnWorker`]: closures as worker handlers
//! - [`TestHarness`]: a deployment wired onto in-memory backends
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_test_utils::{pipeline_config, RecordingContext, TestHarness};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestHarness::new(pipeline_config()).await;
//!     let ctx = std::sync::Arc::new(RecordingContext::new());
//!     // ... run test ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code.
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod context;
pub mod fixtures;
pub mod flaky;
pub mod worker;

pub use context::*;
pub use fixtures::*;
pub use flaky::*;
pub use worker::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("weft=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
