//! Progress notices emitted during a deploy.

use launchpad_core::{BuildPhase, Capability, EnvironmentMap};
use std::fmt;
use std::path::PathBuf;

/// Event emitted during deploy execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployEvent {
    Connected {
        cluster: String,
        version: String,
    },
    RouteCreated {
        host: String,
    },
    DeployerEngaged {
        deployer: String,
        capability: Capability,
    },
    DeployerDisabled {
        deployer: String,
        capability: Capability,
    },
    EnvironmentSet {
        env: EnvironmentMap,
        /// Some values came from disabled deployers.
        needs_review: bool,
    },
    ResourcesPersisted {
        files: Vec<PathBuf>,
    },
    BuildStarted {
        build: String,
    },
    BuildPhase {
        build: String,
        phase: BuildPhase,
    },
    BuildCompleted {
        build: String,
    },
    AwaitingRollout {
        deployment: String,
    },
    Completed {
        url: String,
    },
}

impl fmt::Display for DeployEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployEvent::Connected { cluster, version } => {
                write!(f, "Connected to {} cluster ({})", cluster, version)
            }
            DeployEvent::RouteCreated { host } => write!(f, "Route host is {}", host),
            DeployEvent::DeployerEngaged {
                deployer,
                capability,
            } => write!(f, "Deployer {} engaged for {}", deployer, capability),
            DeployEvent::DeployerDisabled {
                deployer,
                capability,
            } => write!(
                f,
                "Deployer {} is disabled; {} was not provisioned",
                deployer, capability
            ),
            DeployEvent::EnvironmentSet { env, needs_review } => {
                if env.is_empty() {
                    return write!(f, "No environment variables set");
                }
                writeln!(f, "Environment variables set:")?;
                for (key, value) in env {
                    writeln!(f, "  {}={}", key, value)?;
                }
                if *needs_review {
                    write!(
                        f,
                        "Some deployers are disabled; review these values and update the deployment if needed"
                    )?;
                }
                Ok(())
            }
            DeployEvent::ResourcesPersisted { files } => {
                write!(f, "Wrote {} resource definitions", files.len())
            }
            DeployEvent::BuildStarted { build } => write!(f, "Build {} started", build),
            DeployEvent::BuildPhase { build, phase } => write!(f, "Build {} is {}", build, phase),
            DeployEvent::BuildCompleted { build } => write!(f, "Build {} complete", build),
            DeployEvent::AwaitingRollout { deployment } => {
                write!(f, "Waiting for deployment {} to be ready", deployment)
            }
            DeployEvent::Completed { url } => write!(f, "Application available at {}", url),
        }
    }
}
