//! # weft-flow
//!
//! Runtime control plane for the Weft serverless pipeline.
//!
//! Weft composes short-lived compute functions and managed message queues
//! into a cooperative event-processing pipeline. This crate is the part
//! that runs in the cloud:
//!
//! - **Coordinator**: samples queue depths and live-worker counts, plans
//!   worker fan-out, and self-chains into a continuously running control
//!   loop built from ephemeral invocations
//! - **Invoker**: amplifies dispatch batches beyond what one coordinator
//!   can issue within its own time budget
//! - **Worker Wrapper**: replaces each user worker's entry point;
//!   fetches input, brackets the concurrency ledger, routes results, and
//!   finalizes exactly once even under crashes
//! - **Routing Engine**: delivers results downstream by queue message or
//!   direct invocation
//! - **Switchover Controller**: brings a freshly provisioned deployment
//!   live and waits for its confirmation artifact
//!
//! Delivery is at-least-once and concurrency accounting is approximate;
//! both are deliberate (see the module docs for `weft_core::ledger`).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use weft_core::prelude::*;
//! use weft_flow::coordinator::{Coordinator, CoordinatorEvent};
//!
//! # async fn example(
//! #     config: Arc<AppConfig>,
//! #     store: StoreGateway,
//! #     queues: QueueGateway,
//! #     invoker: Arc<dyn FunctionInvoker>,
//! #     ctx: Arc<dyn weft_flow::context::LifecycleContext>,
//! # ) -> weft_flow::Result<()> {
//! let coordinator = Coordinator::new(config, store, queues, invoker);
//! coordinator.handle(CoordinatorEvent::default(), ctx).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod context;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod invoker;
pub mod metrics;
pub mod plan;
pub mod routing;
pub mod status;
pub mod switchover;
pub mod wrapper;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::context::{Completion, LifecycleContext, WrappedContext};
    pub use crate::coordinator::{Coordinator, CoordinatorEvent};
    pub use crate::dispatch::{DispatchSummary, Dispatcher};
    pub use crate::error::{Error, Result};
    pub use crate::invoker::{Invoker, InvokerEvent};
    pub use crate::metrics::FlowMetrics;
    pub use crate::plan::{InvocationCount, InvocationPlan};
    pub use crate::routing::{Routing, RoutingEngine, RoutingExpr};
    pub use crate::status::{ApplicationStatus, ComponentStatus};
    pub use crate::switchover::{SwitchoverController, SwitchoverHook};
    pub use crate::wrapper::{Worker, WorkerWrapper};
}

// Re-export key types at crate root for ergonomics.
pub use context::{Completion, LifecycleContext, WrappedContext};
pub use coordinator::{Coordinator, CoordinatorEvent};
pub use error::{Error, Result};
pub use invoker::{Invoker, InvokerEvent};
pub use plan::{InvocationCount, InvocationPlan};
pub use routing::{Routing, RoutingEngine};
pub use status::ApplicationStatus;
pub use switchover::SwitchoverController;
pub use wrapper::{Worker, WorkerWrapper};
