//! The resource map: symbolic component names to provisioned identifiers.
//!
//! Provisioning emits concrete queue URLs and function identifiers under
//! symbolic output names (`{name}Function`, `{name}Queue`,
//! `{name}LedgerQueue`). The map is published to the object store at
//! deployment time and loaded exactly once per invocation; it never
//! changes for the life of an invocation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths::DeployPaths;
use crate::storage::StoreGateway;

/// Immutable name-to-identifier snapshot for one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceMap {
    entries: BTreeMap<String, String>,
}

/// Returns the symbolic key for a component's worker function.
#[must_use]
pub fn function_key(component: &str) -> String {
    format!("{component}Function")
}

/// Returns the symbolic key for a component's input queue.
#[must_use]
pub fn input_queue_key(component: &str) -> String {
    format!("{component}Queue")
}

/// Returns the symbolic key for a component's ledger queue.
#[must_use]
pub fn ledger_queue_key(component: &str) -> String {
    format!("{component}LedgerQueue")
}

impl ResourceMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a symbolic output, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Looks up a symbolic output.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a component's worker function identifier.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the missing symbolic key.
    pub fn function(&self, component: &str) -> Result<&str> {
        self.require(&function_key(component))
    }

    /// Resolves a component's input queue identifier.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the missing symbolic key.
    pub fn input_queue(&self, component: &str) -> Result<&str> {
        self.require(&input_queue_key(component))
    }

    /// Resolves a component's ledger queue identifier.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the missing symbolic key.
    pub fn ledger_queue(&self, component: &str) -> Result<&str> {
        self.require(&ledger_queue_key(component))
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            Error::configuration(format!("resource map has no entry for '{key}'"))
        })
    }

    /// Loads the map published for a deployment.
    ///
    /// Callers load once per invocation and share the snapshot; a failure
    /// here is fatal to the invocation.
    ///
    /// # Errors
    ///
    /// Returns the storage or deserialization error.
    pub async fn load(store: &StoreGateway, paths: &DeployPaths) -> Result<Self> {
        let value = store.get_json(&paths.resource_map()).await?;
        serde_json::from_value(value).map_err(Error::serialization)
    }

    /// Publishes the map to the deployment's well-known key.
    ///
    /// # Errors
    ///
    /// Returns the storage or serialization error.
    pub async fn publish(&self, store: &StoreGateway, paths: &DeployPaths) -> Result<()> {
        let value = serde_json::to_value(self).map_err(Error::serialization)?;
        store.put_json(&paths.resource_map(), &value).await
    }
}

impl FromIterator<(String, String)> for ResourceMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use std::sync::Arc;

    #[test]
    fn typed_accessors_use_symbolic_keys() {
        let mut map = ResourceMap::new();
        map.insert("ingestFunction", "arn:fn:ingest");
        map.insert("ingestQueue", "https://queue/ingest");
        map.insert("ingestLedgerQueue", "https://queue/ingest-ledger");

        assert_eq!(map.function("ingest").expect("function"), "arn:fn:ingest");
        assert_eq!(
            map.input_queue("ingest").expect("queue"),
            "https://queue/ingest"
        );
        assert_eq!(
            map.ledger_queue("ingest").expect("ledger"),
            "https://queue/ingest-ledger"
        );
    }

    #[test]
    fn missing_entry_names_the_key() {
        let map = ResourceMap::new();
        let err = map.function("ingest").expect_err("missing entry");
        assert!(err.to_string().contains("ingestFunction"));
    }

    #[tokio::test]
    async fn publish_load_roundtrip() {
        let store = StoreGateway::new(Arc::new(MemoryObjectStore::new()));
        let paths = DeployPaths::new("deploys", "pipeline", 1);

        let mut map = ResourceMap::new();
        map.insert("coordinatorFunction", "arn:fn:coordinator");
        map.publish(&store, &paths).await.expect("publish");

        let loaded = ResourceMap::load(&store, &paths).await.expect("load");
        assert_eq!(loaded, map);
    }

    #[tokio::test]
    async fn load_fails_when_unpublished() {
        let store = StoreGateway::new(Arc::new(MemoryObjectStore::new()));
        let paths = DeployPaths::new("deploys", "pipeline", 1);
        let err = ResourceMap::load(&store, &paths)
            .await
            .expect_err("unpublished map");
        assert!(err.is_not_found());
    }
}
