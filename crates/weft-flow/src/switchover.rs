//! Switchover controller: bringing a freshly provisioned deployment live.
//!
//! Run by the deployment driver after provisioning, never inside the
//! pipeline. The sequence is strictly serial: publish the resource map,
//! seed the coordinator fleet spaced across one interval, wait for the
//! generation-1 confirmation artifact, then run the user's optional
//! switchover hook. Any failure aborts the sequence and skips the hook:
//! an unconfirmed deployment must not be announced as live.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;

use weft_core::config::{AppConfig, COORDINATOR_NAME};
use weft_core::invoke::FunctionInvoker;
use weft_core::paths::DeployPaths;
use weft_core::resource_map::ResourceMap;
use weft_core::storage::StoreGateway;

use crate::error::{Error, Result};
use crate::handshake;

/// Cadence of confirmation polling.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// The user's switchover hook, run once the deployment is confirmed.
pub type SwitchoverHook = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Drives the post-provisioning switchover sequence.
pub struct SwitchoverController {
    config: Arc<AppConfig>,
    store: StoreGateway,
    invoker: Arc<dyn FunctionInvoker>,
    paths: DeployPaths,
}

impl std::fmt::Debug for SwitchoverController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchoverController")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl SwitchoverController {
    /// Creates the controller for one deployment.
    #[must_use]
    pub fn new(
        config: Arc<AppConfig>,
        store: StoreGateway,
        invoker: Arc<dyn FunctionInvoker>,
    ) -> Self {
        let paths = config.deploy_paths();
        Self {
            config,
            store,
            invoker,
            paths,
        }
    }

    /// Runs the switchover sequence with the provisioner's outputs.
    ///
    /// # Errors
    ///
    /// Returns the first step's error; later steps (including the hook)
    /// are skipped once a step fails.
    pub async fn run(&self, outputs: ResourceMap, hook: Option<SwitchoverHook>) -> Result<()> {
        outputs.publish(&self.store, &self.paths).await?;
        tracing::info!(key = %self.paths.resource_map(), "resource map published");

        self.seed_coordinators(&outputs).await?;
        self.await_confirmation().await?;

        if let Some(hook) = hook {
            tracing::info!("running switchover hook");
            hook().await?;
        }
        Ok(())
    }

    /// Seeds `coordinatorConcurrency` coordinator invocations, spaced
    /// evenly across one pass interval so the chains interleave instead
    /// of stampeding.
    async fn seed_coordinators(&self, outputs: &ResourceMap) -> Result<()> {
        let function = outputs.function(COORDINATOR_NAME)?;
        let fleet = self.config.coordinator.coordinator_concurrency.max(1);
        let spacing = self.config.coordinator.interval() / fleet;

        for seed in 0..fleet {
            self.invoker.invoke_event(function, &json!({})).await?;
            tracing::info!(seed = seed + 1, fleet, "coordinator seeded");
            if seed + 1 < fleet && !spacing.is_zero() {
                tokio::time::sleep(spacing).await;
            }
        }
        Ok(())
    }

    /// Polls for the generation-1 confirmation artifact.
    async fn await_confirmation(&self) -> Result<()> {
        let deadline =
            Duration::from_secs(2 * (u64::from(self.config.coordinator.min_interval) + 1));
        let started = tokio::time::Instant::now();

        loop {
            if handshake::confirmed(&self.store, &self.paths).await? {
                tracing::info!("deployment confirmed");
                return Ok(());
            }
            if started.elapsed() >= deadline {
                return Err(Error::ConfirmationTimeout {
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }
}
