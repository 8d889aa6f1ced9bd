//! Deployment handshake: the generation-1 confirmation artifact.
//!
//! The first coordinator pass that completes without error writes a small
//! text object at a well-known key. The switchover controller polls for
//! it to learn that the freshly provisioned control plane is actually
//! alive. Only generation 1 writes, so later passes never overwrite it.

use chrono::Utc;

use weft_core::paths::DeployPaths;
use weft_core::storage::StoreGateway;

use crate::error::Result;

/// Writes the confirmation artifact for this deployment.
///
/// # Errors
///
/// Returns the storage error once retries are exhausted.
pub async fn confirm(store: &StoreGateway, paths: &DeployPaths) -> Result<()> {
    let body = format!("confirmed at {}\n", Utc::now().to_rfc3339());
    store
        .put_text(&paths.confirmation(), &body, "text/plain")
        .await?;
    tracing::info!(key = %paths.confirmation(), "deployment confirmed");
    Ok(())
}

/// Returns whether the confirmation artifact has been written.
///
/// # Errors
///
/// Returns the storage error once retries are exhausted; a definitive
/// not-found is `Ok(false)`.
pub async fn confirmed(store: &StoreGateway, paths: &DeployPaths) -> Result<bool> {
    Ok(store.exists(&paths.confirmation()).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use weft_core::storage::MemoryObjectStore;

    #[tokio::test]
    async fn confirm_then_probe() {
        let backend = Arc::new(MemoryObjectStore::new());
        let store = StoreGateway::new(backend.clone());
        let paths = DeployPaths::new("deploys", "pipeline", 1);

        assert!(!confirmed(&store, &paths).await.expect("probe"));
        confirm(&store, &paths).await.expect("confirm");
        assert!(confirmed(&store, &paths).await.expect("probe"));
        assert_eq!(
            backend.content_type("deploys/pipeline/1/confirm.txt").as_deref(),
            Some("text/plain")
        );
    }
}
