//! Logging bootstrap and span helpers.
//!
//! Structured logging with consistent spans across coordinator, invoker,
//! and worker invocations. Invocations are short-lived, so the subscriber
//! is installed once per process and reused across warm starts.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Safe to call on every invocation; only the first call installs the
/// subscriber. `RUST_LOG` controls levels (default `info`).
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for one coordinator pass.
#[must_use]
pub fn coordinator_span(generation: u64) -> Span {
    tracing::info_span!("coordinator", generation)
}

/// Creates a span for one wrapped worker invocation.
#[must_use]
pub fn worker_span(component: &str) -> Span {
    tracing::info_span!("worker", component)
}

/// Creates a span for one invoker fan-out pass.
#[must_use]
pub fn invoker_span(batch_size: usize) -> Span {
    tracing::info_span!("invoker", batch_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json);
    }

    #[test]
    fn span_helpers_create_spans() {
        let span = coordinator_span(3);
        let _guard = span.enter();
        tracing::info!("message inside coordinator span");

        let span = worker_span("ingest");
        let _guard = span.enter();
        tracing::info!("message inside worker span");
    }
}
