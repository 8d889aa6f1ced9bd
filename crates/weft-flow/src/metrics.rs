//! Observability metrics for the control plane.
//!
//! Prometheus-compatible metrics via the `metrics` crate facade. The
//! fleet is made of short-lived invocations, so everything here is a
//! process-global counter/gauge/histogram that an exporter in the runtime
//! image scrapes or pushes.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `weft_flow_coordinator_passes_total` | Counter | `status` | Coordinator passes by outcome |
//! | `weft_flow_coordinator_pass_duration_seconds` | Histogram | - | Wall-clock time of one pass |
//! | `weft_flow_dispatches_total` | Counter | `kind`, `status` | Plan dispatches by kind and outcome |
//! | `weft_flow_completions_total` | Counter | `component`, `mode` | Wrapper completions by mode |
//! | `weft_flow_component_concurrency` | Gauge | `component` | Measured live-worker count |
//! | `weft_flow_component_backlog` | Gauge | `component` | Measured input queue backlog |
//! | `weft_flow_chain_failures_total` | Counter | - | Failed coordinator self-chains |

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: coordinator passes by outcome.
    pub const COORDINATOR_PASSES_TOTAL: &str = "weft_flow_coordinator_passes_total";
    /// Histogram: wall-clock duration of one coordinator pass in seconds.
    pub const COORDINATOR_PASS_DURATION_SECONDS: &str =
        "weft_flow_coordinator_pass_duration_seconds";
    /// Counter: plan dispatches by kind and outcome.
    pub const DISPATCHES_TOTAL: &str = "weft_flow_dispatches_total";
    /// Counter: wrapper completions by component and mode.
    pub const COMPLETIONS_TOTAL: &str = "weft_flow_completions_total";
    /// Gauge: measured live-worker count per component.
    pub const COMPONENT_CONCURRENCY: &str = "weft_flow_component_concurrency";
    /// Gauge: measured input queue backlog per component.
    pub const COMPONENT_BACKLOG: &str = "weft_flow_component_backlog";
    /// Counter: failed coordinator self-chains.
    pub const CHAIN_FAILURES_TOTAL: &str = "weft_flow_chain_failures_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Outcome status (ok, failed).
    pub const STATUS: &str = "status";
    /// Dispatch kind (worker, invoker, chain, redundancy).
    pub const KIND: &str = "kind";
    /// Component name.
    pub const COMPONENT: &str = "component";
    /// Wrapper completion mode (done, fail, succeed).
    pub const MODE: &str = "mode";
}

/// High-level interface for recording control-plane metrics.
///
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowMetrics;

impl FlowMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records one finished coordinator pass.
    pub fn record_coordinator_pass(&self, status: &str, duration: Duration) {
        counter!(
            names::COORDINATOR_PASSES_TOTAL,
            labels::STATUS => status.to_string(),
        )
        .increment(1);
        histogram!(names::COORDINATOR_PASS_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Records one plan dispatch attempt.
    pub fn record_dispatch(&self, kind: &str, status: &str) {
        counter!(
            names::DISPATCHES_TOTAL,
            labels::KIND => kind.to_string(),
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Records one wrapper completion.
    pub fn record_completion(&self, component: &str, mode: &str) {
        counter!(
            names::COMPLETIONS_TOTAL,
            labels::COMPONENT => component.to_string(),
            labels::MODE => mode.to_string(),
        )
        .increment(1);
    }

    /// Publishes one component's measured concurrency.
    #[allow(clippy::cast_precision_loss)] // Gauge values are small counts.
    pub fn set_component_concurrency(&self, component: &str, concurrency: u64) {
        gauge!(
            names::COMPONENT_CONCURRENCY,
            labels::COMPONENT => component.to_string(),
        )
        .set(concurrency as f64);
    }

    /// Publishes one component's measured backlog.
    #[allow(clippy::cast_precision_loss)] // Gauge values are small counts.
    pub fn set_component_backlog(&self, component: &str, backlog: u64) {
        gauge!(
            names::COMPONENT_BACKLOG,
            labels::COMPONENT => component.to_string(),
        )
        .set(backlog as f64);
    }

    /// Records a failed coordinator self-chain.
    pub fn record_chain_failure(&self) {
        counter!(names::CHAIN_FAILURES_TOTAL).increment(1);
    }
}

/// RAII guard for timing operations: records the elapsed duration when
/// dropped.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a guard that calls `on_drop` with the elapsed duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop(self.start.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_exporter_is_a_no_op() {
        let metrics = FlowMetrics::new();
        metrics.record_coordinator_pass("ok", Duration::from_millis(12));
        metrics.record_dispatch("worker", "ok");
        metrics.record_completion("ingest", "succeed");
        metrics.set_component_concurrency("ingest", 3);
        metrics.record_chain_failure();
    }

    #[test]
    fn timing_guard_fires_on_drop() {
        let mut recorded = None;
        {
            let _guard = TimingGuard::new(|elapsed| recorded = Some(elapsed));
        }
        assert!(recorded.is_some());
    }
}
