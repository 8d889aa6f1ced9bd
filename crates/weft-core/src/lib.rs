//! # weft-core
//!
//! Core gateways and shared primitives for the Weft serverless pipeline
//! runtime.
//!
//! Weft composes short-lived compute functions and managed message queues
//! into a cooperative event-processing pipeline. This crate provides the
//! leaves that the control plane in `weft-flow` stands on:
//!
//! - **Queue Gateway**: send / receive-with-visibility / delete /
//!   approximate depth over the managed queue service
//! - **Object Store Gateway**: per-deployment artifact storage with retry
//! - **Function Invoker**: the platform's event-style invoke primitive
//! - **Retry Harness**: bounded retry for flaky cloud APIs
//! - **Concurrency Ledger**: live-worker accounting over queue depth
//! - **Resource Map / Deploy Paths / Configuration**: the frozen
//!   deployment inputs every invocation loads
//!
//! Every gateway is a trait with an in-memory backend for tests; the
//! production AWS backends live behind the `aws` feature.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use weft_core::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> weft_core::Result<()> {
//! let queues = QueueGateway::new(Arc::new(MemoryQueueClient::new()));
//! queues.send("input", r#"{"x":1}"#).await?;
//! assert_eq!(queues.approximate_depth("input").await?, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

#[cfg(feature = "aws")]
pub mod aws;
pub mod config;
pub mod error;
pub mod invoke;
pub mod ledger;
pub mod observability;
pub mod paths;
pub mod queue;
pub mod resource_map;
pub mod retry;
pub mod storage;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{
        AppConfig, ComponentConfig, ComponentKind, CoordinatorSettings, DeployId, RouteTargets,
        COORDINATOR_NAME, INVOKER_NAME,
    };
    pub use crate::error::{Error, Result};
    pub use crate::invoke::{FunctionInvoker, MemoryInvoker, RecordedInvocation};
    pub use crate::ledger::ConcurrencyLedger;
    pub use crate::paths::DeployPaths;
    pub use crate::queue::{MemoryQueueClient, QueueClient, QueueGateway, ReceivedMessage};
    pub use crate::resource_map::ResourceMap;
    pub use crate::retry::with_retries;
    pub use crate::storage::{MemoryObjectStore, ObjectStore, StoreGateway};
}

// Re-export key types at crate root for ergonomics.
pub use config::{AppConfig, ComponentConfig, ComponentKind, COORDINATOR_NAME, INVOKER_NAME};
pub use error::{Error, Result};
pub use invoke::{FunctionInvoker, MemoryInvoker};
pub use ledger::ConcurrencyLedger;
pub use observability::{init_logging, LogFormat};
pub use paths::DeployPaths;
pub use queue::{MemoryQueueClient, QueueGateway};
pub use resource_map::ResourceMap;
pub use storage::{MemoryObjectStore, StoreGateway};
