//! Applies resource definitions and keeps a local copy of each.

use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::{Cluster, Error, ResourceDefinition, ResourceKind, Result};

/// Bound on the wait for a deployment rollout.
pub const DEFAULT_ROLLOUT_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of applying one definition.
#[derive(Debug, Clone)]
pub struct AppliedResource {
    /// Object as returned by the cluster.
    pub object: Value,
    /// Where the definition was persisted.
    pub path: PathBuf,
}

/// Applies definitions idempotently and persists each one under the output
/// directory as `<component>-<kind>.yaml`.
///
/// A (kind, name) pair may be applied at most once per reconciler; one
/// reconciler lives for one deploy invocation.
pub struct Reconciler {
    cluster: Arc<dyn Cluster>,
    output_dir: PathBuf,
    applied: Mutex<BTreeSet<(ResourceKind, String)>>,
    persisted: Mutex<Vec<PathBuf>>,
}

impl Reconciler {
    pub fn new(cluster: Arc<dyn Cluster>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            cluster,
            output_dir: output_dir.into(),
            applied: Mutex::new(BTreeSet::new()),
            persisted: Mutex::new(Vec::new()),
        }
    }

    pub fn cluster(&self) -> &Arc<dyn Cluster> {
        &self.cluster
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create or update `resource`, then persist it.
    pub async fn apply(&self, resource: &ResourceDefinition) -> Result<AppliedResource> {
        self.claim(resource)?;

        info!(kind = %resource.kind(), name = %resource.name(), "Applying resource");
        let object = self.cluster.apply(resource).await?;
        let path = self.persist(resource).await?;

        Ok(AppliedResource { object, path })
    }

    /// Write the definition to the output directory.
    pub async fn persist(&self, resource: &ResourceDefinition) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(resource.file_name());
        tokio::fs::write(&path, resource.to_yaml()?).await?;
        debug!(path = %path.display(), "Persisted resource definition");

        self.lock_persisted()?.push(path.clone());
        Ok(path)
    }

    /// Host assigned to a route by the cluster.
    pub async fn route_host(&self, name: &str) -> Result<String> {
        let route = self
            .cluster
            .get(ResourceKind::Route, name)
            .await?
            .ok_or_else(|| Error::Cluster(format!("route {} not found after apply", name)))?;

        route["spec"]["host"]
            .as_str()
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::Cluster(format!("route {} has no host assigned", name)))
    }

    /// Block until the deployment rollout is ready.
    pub async fn await_rollout(&self, name: &str, timeout: Duration) -> Result<()> {
        info!(deployment = %name, timeout_secs = timeout.as_secs(), "Waiting for rollout");
        self.cluster
            .wait_until_ready(ResourceKind::Deployment, name, timeout)
            .await
    }

    /// Files persisted so far, in apply order.
    pub fn persisted(&self) -> Result<Vec<PathBuf>> {
        Ok(self.lock_persisted()?.clone())
    }

    fn claim(&self, resource: &ResourceDefinition) -> Result<()> {
        let mut applied = self
            .applied
            .lock()
            .map_err(|_| Error::Internal("reconciler state poisoned".to_string()))?;
        if !applied.insert((resource.kind(), resource.name().to_string())) {
            return Err(Error::Internal(format!(
                "{} {} was already applied in this deploy",
                resource.kind(),
                resource.name()
            )));
        }
        Ok(())
    }

    fn lock_persisted(&self) -> Result<std::sync::MutexGuard<'_, Vec<PathBuf>>> {
        self.persisted
            .lock()
            .map_err(|_| Error::Internal("reconciler state poisoned".to_string()))
    }
}
