//! Configuration fixtures and an in-memory deployment harness.

use std::sync::Arc;

use weft_core::config::{
    AppConfig, ComponentConfig, ComponentKind, CoordinatorSettings, DeployId, DeploymentConfig,
    RoleConfig, RouteTargets, WorkerSettings, COORDINATOR_NAME, INVOKER_NAME,
};
use weft_core::invoke::MemoryInvoker;
use weft_core::paths::DeployPaths;
use weft_core::queue::{MemoryQueueClient, QueueGateway};
use weft_core::resource_map::{function_key, input_queue_key, ledger_queue_key, ResourceMap};
use weft_core::storage::{MemoryObjectStore, StoreGateway};

/// A three-component pipeline: `ingest` (message-consuming, routed to
/// `enrich`) → `enrich` (message-consuming) and `notify`
/// (direct-invocation).
pub fn pipeline_config() -> AppConfig {
    AppConfig {
        name: "pipeline".into(),
        version: "1.0.0".into(),
        deploy_id: DeployId::Number(1),
        deployment: DeploymentConfig {
            region: "us-east-1".into(),
            s3_bucket: "artifacts".into(),
            s3_key_prefix: "deploys".into(),
            tags: std::collections::BTreeMap::new(),
            switchover_hook: None,
            skip_build: false,
            skip_provisioning: false,
        },
        coordinator: CoordinatorSettings {
            coordinator_concurrency: 1,
            max_api_concurrency: 8,
            max_invocation_count: 6,
            min_interval: 10,
        },
        roles: vec![RoleConfig {
            name: "worker".into(),
            managed_policies: Vec::new(),
        }],
        components: vec![
            message_component("ingest", Some(RouteTargets::One("enrich".into()))),
            message_component("enrich", None),
            ComponentConfig {
                name: "notify".into(),
                kind: ComponentKind::FromInvocation,
                worker: worker_settings("notify"),
                routing: None,
                max_concurrency: None,
                queue_wait_seconds: None,
            },
        ],
    }
}

/// A message-consuming component with a concurrency ceiling of 10.
pub fn message_component(name: &str, routing: Option<RouteTargets>) -> ComponentConfig {
    ComponentConfig {
        name: name.into(),
        kind: ComponentKind::FromMessage,
        worker: worker_settings(name),
        routing,
        max_concurrency: Some(10),
        queue_wait_seconds: Some(0),
    }
}

fn worker_settings(name: &str) -> WorkerSettings {
    WorkerSettings {
        handler: format!("{name}.main"),
        memory: 256,
        timeout: 30,
        role: "worker".into(),
    }
}

/// The resource map a provisioner would emit for `config`: functions,
/// ledger queues, input queues, and the two internal components.
pub fn resource_map_for(config: &AppConfig) -> ResourceMap {
    let mut map = ResourceMap::new();
    for component in &config.components {
        let name = component.name.as_str();
        map.insert(function_key(name), format!("fn-{name}"));
        map.insert(ledger_queue_key(name), format!("{name}-ledger"));
        if component.is_from_message() {
            map.insert(input_queue_key(name), format!("{name}-input"));
        }
    }
    for internal in [COORDINATOR_NAME, INVOKER_NAME] {
        map.insert(function_key(internal), format!("fn-{internal}"));
        map.insert(ledger_queue_key(internal), format!("{internal}-ledger"));
    }
    map
}

/// One deployment wired onto in-memory backends.
pub struct TestHarness {
    /// The application configuration.
    pub config: Arc<AppConfig>,
    /// The published resource map.
    pub map: Arc<ResourceMap>,
    /// Raw object store backend, for direct inspection.
    pub store_backend: Arc<MemoryObjectStore>,
    /// Raw queue backend, for direct inspection.
    pub queue_backend: Arc<MemoryQueueClient>,
    /// Recording invoker.
    pub invoker: Arc<MemoryInvoker>,
    /// Store gateway over the backend.
    pub store: StoreGateway,
    /// Queue gateway over the backend.
    pub queues: QueueGateway,
    /// The deployment's artifact paths.
    pub paths: DeployPaths,
}

impl TestHarness {
    /// Builds a harness and publishes the resource map.
    pub async fn new(config: AppConfig) -> Self {
        let harness = Self::unpublished(config);
        harness
            .map
            .publish(&harness.store, &harness.paths)
            .await
            .expect("resource map publish should succeed");
        harness
    }

    /// Builds a harness *without* publishing the resource map, for tests
    /// exercising the fatal load path.
    pub fn unpublished(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let map = Arc::new(resource_map_for(&config));
        let store_backend = Arc::new(MemoryObjectStore::new());
        let queue_backend = Arc::new(MemoryQueueClient::new());
        let invoker = Arc::new(MemoryInvoker::new());
        let store = StoreGateway::new(store_backend.clone());
        let queues = QueueGateway::new(queue_backend.clone());
        let paths = config.deploy_paths();
        Self {
            config,
            map,
            store_backend,
            queue_backend,
            invoker,
            store,
            queues,
            paths,
        }
    }

    /// Returns the provisioned input queue identifier for a component.
    pub fn input_queue(&self, name: &str) -> String {
        format!("{name}-input")
    }

    /// Returns the provisioned ledger queue identifier for a component.
    pub fn ledger_queue(&self, name: &str) -> String {
        format!("{name}-ledger")
    }

    /// Returns the provisioned function identifier for a component.
    pub fn function(&self, name: &str) -> String {
        format!("fn-{name}")
    }

    /// Places a message on a component's input queue.
    pub async fn send_input(&self, name: &str, body: &str) {
        self.queues
            .send(&self.input_queue(name), body)
            .await
            .expect("input send should succeed");
    }

    /// Returns a component's visible input backlog.
    pub async fn input_depth(&self, name: &str) -> u64 {
        self.queues
            .approximate_depth(&self.input_queue(name))
            .await
            .expect("depth should succeed")
    }

    /// Returns a component's visible ledger depth.
    pub async fn ledger_depth(&self, name: &str) -> u64 {
        self.queues
            .approximate_depth(&self.ledger_queue(name))
            .await
            .expect("depth should succeed")
    }

    /// Pre-loads a component's ledger with `count` live-worker records.
    pub async fn seed_ledger(&self, name: &str, count: u64) {
        for _ in 0..count {
            self.queues
                .send(&self.ledger_queue(name), "{}")
                .await
                .expect("ledger send should succeed");
        }
    }
}
