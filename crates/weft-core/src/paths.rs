//! Typed path helpers for per-deployment object store artifacts.
//!
//! Every deployment owns a prefix `<s3KeyPrefix>/<name>/<deployId>/` under
//! which the control plane keeps exactly three objects: the resource map,
//! an advisory copy of the configuration, and the confirmation artifact.

use std::fmt;

/// Typed object keys for one deployment's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPaths {
    prefix: String,
}

impl DeployPaths {
    /// Creates the paths for `app` at `deploy_id` under `key_prefix`.
    ///
    /// The key prefix is normalized: surrounding slashes are trimmed and
    /// an empty prefix roots the deployment at the bucket top level.
    pub fn new(key_prefix: &str, app: &str, deploy_id: impl fmt::Display) -> Self {
        let trimmed = key_prefix.trim_matches('/');
        let prefix = if trimmed.is_empty() {
            format!("{app}/{deploy_id}")
        } else {
            format!("{trimmed}/{app}/{deploy_id}")
        };
        Self { prefix }
    }

    /// Returns the deployment prefix (no trailing slash).
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the resource map key.
    #[must_use]
    pub fn resource_map(&self) -> String {
        format!("{}/arnMap.json", self.prefix)
    }

    /// Returns the advisory configuration copy key.
    #[must_use]
    pub fn advisory_config(&self) -> String {
        format!("{}/config.js", self.prefix)
    }

    /// Returns the confirmation artifact key.
    #[must_use]
    pub fn confirmation(&self) -> String {
        format!("{}/confirm.txt", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_prefix() {
        let paths = DeployPaths::new("deploys", "pipeline", 7);
        assert_eq!(paths.resource_map(), "deploys/pipeline/7/arnMap.json");
        assert_eq!(paths.advisory_config(), "deploys/pipeline/7/config.js");
        assert_eq!(paths.confirmation(), "deploys/pipeline/7/confirm.txt");
    }

    #[test]
    fn prefix_is_normalized() {
        let paths = DeployPaths::new("/deploys/ci/", "pipeline", "v3");
        assert_eq!(paths.prefix(), "deploys/ci/pipeline/v3");
    }

    #[test]
    fn empty_prefix_roots_at_bucket() {
        let paths = DeployPaths::new("", "pipeline", "v3");
        assert_eq!(paths.resource_map(), "pipeline/v3/arnMap.json");
    }
}
