//! Object store gateway for deployment artifacts.
//!
//! The control plane keeps three small objects per deployment (the
//! resource map, an advisory config copy, and the confirmation artifact),
//! so the contract is deliberately narrow: whole-object put/get plus an
//! existence probe. [`StoreGateway`] layers the retry harness and JSON
//! helpers over an [`ObjectStore`] backend.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::retry::with_retries;

/// Backend trait for the object store.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Writes an object, overwriting any existing content.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()>;

    /// Reads an entire object.
    ///
    /// Returns [`Error::NotFound`] if the object doesn't exist.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Returns whether the object exists.
    ///
    /// A definitive not-found from the service is `Ok(false)`, never an
    /// error; only genuine service faults are errors.
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Retry-wrapped facade over an [`ObjectStore`].
#[derive(Clone)]
pub struct StoreGateway {
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for StoreGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreGateway").finish_non_exhaustive()
    }
}

impl StoreGateway {
    /// Creates a gateway over the given backend.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Serializes `value` as JSON and writes it. Retried.
    ///
    /// # Errors
    ///
    /// Returns a serialization error or the last put error.
    pub async fn put_json(&self, key: &str, value: &Value) -> Result<()> {
        let data = Bytes::from(serde_json::to_vec(value).map_err(Error::serialization)?);
        with_retries("store put", || {
            self.store.put(key, data.clone(), "application/json")
        })
        .await
    }

    /// Writes a text object with the given content type. Retried.
    ///
    /// # Errors
    ///
    /// Returns the last put error once retries are exhausted.
    pub async fn put_text(&self, key: &str, contents: &str, content_type: &str) -> Result<()> {
        let data = Bytes::copy_from_slice(contents.as_bytes());
        with_retries("store put", || {
            self.store.put(key, data.clone(), content_type)
        })
        .await
    }

    /// Reads an object and parses it as JSON. Retried.
    ///
    /// # Errors
    ///
    /// Returns the last read error or a deserialization error.
    pub async fn get_json(&self, key: &str) -> Result<Value> {
        let data = with_retries("store get", || self.store.get(key)).await?;
        serde_json::from_slice(&data).map_err(Error::serialization)
    }

    /// Returns whether the object exists.
    ///
    /// Retried, but a definitive not-found short-circuits the retry loop
    /// as `false`.
    ///
    /// # Errors
    ///
    /// Returns the last probe error once retries are exhausted.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        with_retries("store exists", || self.store.exists(key)).await
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// In-memory object store for testing.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored content type of an object, if present.
    ///
    /// Test helper; production code never inspects content types.
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .ok()?
            .get(key)
            .map(|o| o.content_type.clone())
    }

    /// Returns the last-modified timestamp of an object, if present.
    pub fn last_modified(&self, key: &str) -> Option<DateTime<Utc>> {
        self.objects.read().ok()?.get(key).map(|o| o.last_modified)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| Error::internal("store lock poisoned"))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let objects = self
            .objects
            .read()
            .map_err(|_| Error::internal("store lock poisoned"))?;
        objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {key}")))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let objects = self
            .objects
            .read()
            .map_err(|_| Error::internal("store lock poisoned"))?;
        Ok(objects.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gateway() -> (StoreGateway, Arc<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::new());
        (StoreGateway::new(store.clone()), store)
    }

    #[tokio::test]
    async fn json_roundtrip() {
        let (gateway, _) = gateway();
        let value = json!({"aQueue": "https://queue/a", "aFunction": "arn:a"});

        gateway
            .put_json("deploys/app/1/arnMap.json", &value)
            .await
            .expect("put should succeed");

        let read = gateway
            .get_json("deploys/app/1/arnMap.json")
            .await
            .expect("get should succeed");
        assert_eq!(read, value);
    }

    #[tokio::test]
    async fn put_text_records_content_type() {
        let (gateway, store) = gateway();
        gateway
            .put_text("deploys/app/1/confirm.txt", "confirmed", "text/plain")
            .await
            .expect("put should succeed");
        assert_eq!(
            store.content_type("deploys/app/1/confirm.txt").as_deref(),
            Some("text/plain")
        );
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (gateway, _) = gateway();
        let err = gateway
            .get_json("missing.json")
            .await
            .expect_err("missing object should error");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn exists_is_definitive() {
        let (gateway, _) = gateway();
        assert!(!gateway.exists("confirm.txt").await.expect("probe"));
        gateway
            .put_text("confirm.txt", "ok", "text/plain")
            .await
            .expect("put");
        assert!(gateway.exists("confirm.txt").await.expect("probe"));
    }
}
