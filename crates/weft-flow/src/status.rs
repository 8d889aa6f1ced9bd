//! Application status measurement.
//!
//! One coordinator pass samples, for every component including the
//! internal two, the ledger depth (live-worker estimate) and, for
//! message-consuming components, the input queue backlog. Measurements
//! fan out with bounded concurrency; an individual failure is logged and
//! leaves its field unset rather than failing the pass.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use weft_core::config::{AppConfig, COORDINATOR_NAME, INVOKER_NAME};
use weft_core::ledger::ConcurrencyLedger;
use weft_core::queue::QueueGateway;
use weft_core::resource_map::ResourceMap;

/// Measured state of one component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Approximate live-worker count, unset when the sample failed.
    pub concurrency: Option<u64>,
    /// Input queue backlog, unset for non-message components or when the
    /// sample failed.
    pub queued_messages: Option<u64>,
}

/// Measured state of the whole application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    /// Per-component measurements, keyed by component name.
    pub components: BTreeMap<String, ComponentStatus>,
}

impl ApplicationStatus {
    /// Returns one component's measurements, if present.
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&ComponentStatus> {
        self.components.get(name)
    }

    /// Returns the measured coordinator concurrency, if the sample landed.
    #[must_use]
    pub fn coordinator_concurrency(&self) -> Option<u64> {
        self.components
            .get(COORDINATOR_NAME)
            .and_then(|c| c.concurrency)
    }
}

/// Samples every component's ledger depth and input backlog.
pub async fn measure(
    config: &AppConfig,
    map: &ResourceMap,
    queues: &QueueGateway,
    ledger: &ConcurrencyLedger,
) -> ApplicationStatus {
    let mut names: Vec<(&str, bool)> = config
        .components
        .iter()
        .map(|c| (c.name.as_str(), c.is_from_message()))
        .collect();
    names.push((COORDINATOR_NAME, false));
    names.push((INVOKER_NAME, false));

    let samples = stream::iter(names)
        .map(|(name, from_message)| async move {
            let concurrency = match ledger.reading(name).await {
                Ok(depth) => Some(depth),
                Err(err) => {
                    tracing::warn!(component = name, error = %err, "ledger sample failed");
                    None
                }
            };

            let queued_messages = if from_message {
                match input_backlog(map, queues, name).await {
                    Ok(depth) => Some(depth),
                    Err(err) => {
                        tracing::warn!(component = name, error = %err, "backlog sample failed");
                        None
                    }
                }
            } else {
                None
            };

            (
                name.to_string(),
                ComponentStatus {
                    concurrency,
                    queued_messages,
                },
            )
        })
        .buffer_unordered(config.coordinator.max_api_concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    ApplicationStatus {
        components: samples.into_iter().collect(),
    }
}

async fn input_backlog(
    map: &ResourceMap,
    queues: &QueueGateway,
    name: &str,
) -> weft_core::Result<u64> {
    let queue = map.input_queue(name)?;
    queues.approximate_depth(queue).await
}
