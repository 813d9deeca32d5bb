//! Cluster API boundary.
//!
//! Everything Launchpad needs from the cluster goes through the `Cluster`
//! trait, so orchestration logic can run against a recording fake in tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::{ResourceDefinition, ResourceKind, Result};

/// Where the binary build archive is written, relative to the working
/// directory.
pub const DEFAULT_ARCHIVE: &str = "launchpad-app.tar.gz";

/// Lifecycle phase of a remote build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildPhase {
    New,
    Pending,
    Running,
    Complete,
    Failed,
    Error,
    Cancelled,
    Unknown(String),
}

impl BuildPhase {
    pub fn parse(phase: &str) -> Self {
        match phase {
            "New" => BuildPhase::New,
            "Pending" => BuildPhase::Pending,
            "Running" => BuildPhase::Running,
            "Complete" => BuildPhase::Complete,
            "Failed" => BuildPhase::Failed,
            "Error" => BuildPhase::Error,
            "Cancelled" => BuildPhase::Cancelled,
            other => BuildPhase::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BuildPhase::New => "New",
            BuildPhase::Pending => "Pending",
            BuildPhase::Running => "Running",
            BuildPhase::Complete => "Complete",
            BuildPhase::Failed => "Failed",
            BuildPhase::Error => "Error",
            BuildPhase::Cancelled => "Cancelled",
            BuildPhase::Unknown(other) => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildPhase::Complete | BuildPhase::Failed | BuildPhase::Error | BuildPhase::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildPhase::Complete)
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One in-flight remote build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRun {
    pub name: String,
    pub build_config: String,
}

/// A phase transition observed on a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildUpdate {
    pub phase: BuildPhase,
    /// Status message reported alongside the phase, if any.
    pub message: Option<String>,
}

impl BuildUpdate {
    pub fn new(phase: BuildPhase) -> Self {
        Self {
            phase,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Subscription to a build's phase transitions.
///
/// Dropping the watch closes the underlying stream, which releases the
/// server-side watch.
pub struct BuildWatch {
    build: String,
    stream: BoxStream<'static, Result<BuildUpdate>>,
}

impl BuildWatch {
    pub fn new(build: impl Into<String>, stream: BoxStream<'static, Result<BuildUpdate>>) -> Self {
        Self {
            build: build.into(),
            stream,
        }
    }

    pub fn build(&self) -> &str {
        &self.build
    }

    /// Next transition, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Result<BuildUpdate>> {
        self.stream.next().await
    }
}

impl fmt::Debug for BuildWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildWatch")
            .field("build", &self.build)
            .finish_non_exhaustive()
    }
}

impl Drop for BuildWatch {
    fn drop(&mut self) {
        debug!(build = %self.build, "Releasing build watch");
    }
}

/// Operations Launchpad performs against the cluster.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Name of this cluster backend.
    fn name(&self) -> &'static str;

    /// Contact the API server; returns its version string.
    async fn server_version(&self) -> Result<String>;

    /// Create the resource if absent, otherwise update it.
    async fn apply(&self, resource: &ResourceDefinition) -> Result<Value>;

    /// Current state of a resource, `None` if it does not exist.
    async fn get(&self, kind: ResourceKind, name: &str) -> Result<Option<Value>>;

    /// Start a binary build of `build_config` from an archive.
    async fn instantiate_binary(&self, build_config: &str, archive: Bytes) -> Result<BuildRun>;

    /// Subscribe to phase transitions of a build.
    async fn watch_build(&self, run: &BuildRun) -> Result<BuildWatch>;

    /// Block until the resource reports ready, failing with
    /// [`crate::Error::Timeout`] after `timeout`.
    async fn wait_until_ready(&self, kind: ResourceKind, name: &str, timeout: Duration)
    -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_phase_parse_round_trip() {
        for phase in [
            "New",
            "Pending",
            "Running",
            "Complete",
            "Failed",
            "Error",
            "Cancelled",
        ] {
            assert_eq!(BuildPhase::parse(phase).as_str(), phase);
        }
        assert_eq!(
            BuildPhase::parse("Paused"),
            BuildPhase::Unknown("Paused".to_string())
        );
    }

    #[test]
    fn test_terminal_phases() {
        assert!(!BuildPhase::Pending.is_terminal());
        assert!(!BuildPhase::Running.is_terminal());
        assert!(BuildPhase::Complete.is_terminal());
        assert!(BuildPhase::Complete.is_success());
        assert!(BuildPhase::Failed.is_terminal());
        assert!(!BuildPhase::Failed.is_success());
        assert!(BuildPhase::Error.is_terminal());
        assert!(BuildPhase::Cancelled.is_terminal());
        assert!(!BuildPhase::Unknown("x".to_string()).is_terminal());
    }

    #[tokio::test]
    async fn test_watch_yields_then_ends() {
        let updates = vec![
            Ok(BuildUpdate::new(BuildPhase::Running)),
            Err(Error::Cluster("connection reset".to_string())),
        ];
        let mut watch = BuildWatch::new("shop-build-1", futures::stream::iter(updates).boxed());

        assert_eq!(watch.build(), "shop-build-1");
        assert_eq!(
            watch.next().await.unwrap().unwrap().phase,
            BuildPhase::Running
        );
        assert!(watch.next().await.unwrap().is_err());
        assert!(watch.next().await.is_none());
    }
}
