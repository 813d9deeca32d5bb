//! Deploy orchestration for Launchpad.
//!
//! Sequences route creation, deployer resolution, the binary build and the
//! application rollout, reporting progress as `DeployEvent`s.

pub mod archive;
pub mod build;
pub mod event;
pub mod orchestrator;

pub use archive::{ArchiveGuard, create_archive};
pub use build::{BuildCoordinator, await_build};
pub use event::DeployEvent;
pub use orchestrator::{DeployOutcome, DeployRequest, DeploymentOrchestrator, endpoint_url};
