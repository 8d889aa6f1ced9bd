//! Application configuration consumed by the control plane.
//!
//! The deployment tooling validates and freezes this configuration before
//! anything runs in the cloud; the types here re-check the documented
//! ranges on entry so a malformed or hand-edited document fails fast
//! instead of misbehaving at runtime.
//!
//! All wire names are camelCase and unrecognized keys are rejected.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths::DeployPaths;

/// Reserved name of the internal coordinator component.
pub const COORDINATOR_NAME: &str = "coordinator";

/// Reserved name of the internal invoker component.
pub const INVOKER_NAME: &str = "invoker";

/// Component names that user configurations may not claim.
pub const RESERVED_COMPONENT_NAMES: [&str; 2] = [COORDINATOR_NAME, INVOKER_NAME];

/// Minimum worker memory in MiB.
pub const MIN_WORKER_MEMORY_MIB: u32 = 128;
/// Maximum worker memory in MiB.
pub const MAX_WORKER_MEMORY_MIB: u32 = 1536;
/// Minimum worker timeout in seconds.
pub const MIN_WORKER_TIMEOUT_SECS: u32 = 3;
/// Maximum worker timeout in seconds.
pub const MAX_WORKER_TIMEOUT_SECS: u32 = 300;
/// Maximum coordinator interval in seconds.
pub const MAX_MIN_INTERVAL_SECS: u32 = 300;
/// Maximum queue long-poll wait in seconds.
pub const MAX_QUEUE_WAIT_SECS: u32 = MAX_WORKER_TIMEOUT_SECS;

/// The validated application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AppConfig {
    /// Application name (alphanumeric).
    pub name: String,
    /// Application version string.
    pub version: String,
    /// Deployment identifier (string or non-negative number).
    pub deploy_id: DeployId,
    /// Deployment target settings.
    pub deployment: DeploymentConfig,
    /// Coordinator tuning.
    pub coordinator: CoordinatorSettings,
    /// Permission roles referenced by workers.
    pub roles: Vec<RoleConfig>,
    /// The application's components.
    pub components: Vec<ComponentConfig>,
}

/// Deployment identifier: a string or a non-negative number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeployId {
    /// Free-form textual identifier.
    Text(String),
    /// Numeric identifier.
    Number(u64),
}

impl fmt::Display for DeployId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

/// Deployment target settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeploymentConfig {
    /// Cloud region.
    pub region: String,
    /// Artifact bucket.
    pub s3_bucket: String,
    /// Key prefix inside the artifact bucket.
    pub s3_key_prefix: String,
    /// Resource tags applied by the provisioner.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Optional switchover hook reference, run after confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switchover_hook: Option<String>,
    /// Skips the build stage when deploying.
    #[serde(default)]
    pub skip_build: bool,
    /// Skips re-provisioning when deploying.
    #[serde(default)]
    pub skip_provisioning: bool,
}

/// Coordinator tuning knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CoordinatorSettings {
    /// How many coordinator instances self-chain in parallel.
    pub coordinator_concurrency: u32,
    /// Cap on concurrently in-flight cloud API calls while dispatching.
    pub max_api_concurrency: usize,
    /// Largest invocation batch one instance issues itself.
    pub max_invocation_count: u32,
    /// Target seconds between coordinator passes.
    pub min_interval: u32,
}

impl CoordinatorSettings {
    /// Returns the pass interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.min_interval as u64)
    }
}

/// A permission role the provisioner creates for workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleConfig {
    /// Role name, unique within the application.
    pub name: String,
    /// Managed policies attached to the role.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_policies: Vec<String>,
}

/// How a component receives its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentKind {
    /// Consumes one message from its input queue per invocation.
    FromMessage,
    /// Receives its event directly in the invocation payload.
    FromInvocation,
    /// Internal control-plane component (coordinator, invoker).
    Internal,
}

/// Static routing targets declared in configuration.
///
/// Expression routing is not representable in the configuration document;
/// it is compiled into the worker bundle and registered at wrap time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteTargets {
    /// A single downstream component.
    One(String),
    /// Several downstream components, each receiving the result.
    Many(Vec<String>),
}

impl RouteTargets {
    /// Returns the target names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::One(name) => vec![name.as_str()],
            Self::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// One component of the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComponentConfig {
    /// Component name, unique within the application.
    pub name: String,
    /// Input mode.
    pub kind: ComponentKind,
    /// Worker function settings.
    pub worker: WorkerSettings,
    /// Static downstream routing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RouteTargets>,
    /// Upper bound on live workers (FromMessage only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
    /// Input queue long-poll seconds (FromMessage only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_wait_seconds: Option<u32>,
}

impl ComponentConfig {
    /// Returns true for message-consuming components.
    #[must_use]
    pub fn is_from_message(&self) -> bool {
        self.kind == ComponentKind::FromMessage
    }

    /// Returns the concurrency ceiling, 0 when not configured.
    #[must_use]
    pub fn max_concurrency(&self) -> u32 {
        self.max_concurrency.unwrap_or(0)
    }

    /// Returns the input queue long-poll wait.
    #[must_use]
    pub fn queue_wait(&self) -> Duration {
        Duration::from_secs(u64::from(self.queue_wait_seconds.unwrap_or(0)))
    }

    /// Returns the worker timeout, which doubles as the input and ledger
    /// message visibility window.
    #[must_use]
    pub fn visibility(&self) -> Duration {
        Duration::from_secs(u64::from(self.worker.timeout))
    }
}

/// Worker function settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkerSettings {
    /// Handler reference inside the worker bundle.
    pub handler: String,
    /// Memory in MiB.
    pub memory: u32,
    /// Timeout in seconds.
    pub timeout: u32,
    /// Name of the permission role the worker runs under.
    pub role: String,
}

impl AppConfig {
    /// Parses a configuration document from JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed documents; call
    /// [`AppConfig::validate`] afterwards for semantic checks.
    pub fn from_json(document: &str) -> Result<Self> {
        serde_json::from_str(document).map_err(Error::serialization)
    }

    /// Looks up a component by name.
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Returns the deployment artifact paths for this configuration.
    #[must_use]
    pub fn deploy_paths(&self) -> DeployPaths {
        DeployPaths::new(&self.deployment.s3_key_prefix, &self.name, &self.deploy_id)
    }

    /// Checks the documented semantic constraints.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || !self.name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::configuration(format!(
                "application name '{}' must be non-empty and alphanumeric",
                self.name
            )));
        }

        let c = &self.coordinator;
        if c.coordinator_concurrency < 1 {
            return Err(Error::configuration("coordinatorConcurrency must be >= 1"));
        }
        if c.max_api_concurrency < 1 {
            return Err(Error::configuration("maxApiConcurrency must be >= 1"));
        }
        if c.max_invocation_count < 1 {
            return Err(Error::configuration("maxInvocationCount must be >= 1"));
        }
        if c.min_interval > MAX_MIN_INTERVAL_SECS {
            return Err(Error::configuration(format!(
                "minInterval must be <= {MAX_MIN_INTERVAL_SECS}, got {}",
                c.min_interval
            )));
        }

        if self.roles.is_empty() {
            return Err(Error::configuration("at least one role is required"));
        }
        let mut role_names = std::collections::HashSet::new();
        for role in &self.roles {
            if !role_names.insert(role.name.as_str()) {
                return Err(Error::configuration(format!(
                    "duplicate role name '{}'",
                    role.name
                )));
            }
        }

        if self.components.is_empty() {
            return Err(Error::configuration("at least one component is required"));
        }
        let mut component_names = std::collections::HashSet::new();
        for component in &self.components {
            self.validate_component(component, &role_names)?;
            if !component_names.insert(component.name.as_str()) {
                return Err(Error::configuration(format!(
                    "duplicate component name '{}'",
                    component.name
                )));
            }
        }

        for component in &self.components {
            if let Some(targets) = &component.routing {
                for target in targets.names() {
                    if !component_names.contains(target) {
                        return Err(Error::configuration(format!(
                            "component '{}' routes to undefined component '{target}'",
                            component.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn validate_component(
        &self,
        component: &ComponentConfig,
        role_names: &std::collections::HashSet<&str>,
    ) -> Result<()> {
        let name = component.name.as_str();
        if name.is_empty() {
            return Err(Error::configuration("component name must be non-empty"));
        }
        if RESERVED_COMPONENT_NAMES.contains(&name) {
            return Err(Error::configuration(format!(
                "component name '{name}' is reserved"
            )));
        }

        let worker = &component.worker;
        if !(MIN_WORKER_MEMORY_MIB..=MAX_WORKER_MEMORY_MIB).contains(&worker.memory) {
            return Err(Error::configuration(format!(
                "component '{name}' worker memory must be in [{MIN_WORKER_MEMORY_MIB}, {MAX_WORKER_MEMORY_MIB}] MiB"
            )));
        }
        if !(MIN_WORKER_TIMEOUT_SECS..=MAX_WORKER_TIMEOUT_SECS).contains(&worker.timeout) {
            return Err(Error::configuration(format!(
                "component '{name}' worker timeout must be in [{MIN_WORKER_TIMEOUT_SECS}, {MAX_WORKER_TIMEOUT_SECS}] s"
            )));
        }
        if !role_names.contains(worker.role.as_str()) {
            return Err(Error::configuration(format!(
                "component '{name}' references undefined role '{}'",
                worker.role
            )));
        }

        match component.kind {
            ComponentKind::FromMessage => {
                match component.max_concurrency {
                    Some(limit) if limit >= 1 => {}
                    _ => {
                        return Err(Error::configuration(format!(
                            "component '{name}' needs maxConcurrency >= 1"
                        )));
                    }
                }
                match component.queue_wait_seconds {
                    Some(wait) if wait <= MAX_QUEUE_WAIT_SECS => {}
                    None => {
                        return Err(Error::configuration(format!(
                            "component '{name}' needs queueWaitSeconds"
                        )));
                    }
                    Some(wait) => {
                        return Err(Error::configuration(format!(
                            "component '{name}' queueWaitSeconds must be <= {MAX_QUEUE_WAIT_SECS}, got {wait}"
                        )));
                    }
                }
            }
            ComponentKind::FromInvocation => {}
            ComponentKind::Internal => {
                return Err(Error::configuration(format!(
                    "component '{name}' may not declare the internal kind"
                )));
            }
        }

        Ok(())
    }
}
