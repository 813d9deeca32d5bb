//! Core domain types and traits for Launchpad.
//!
//! This crate contains:
//! - Application identity and detected capabilities
//! - The ordered environment map deployers contribute to
//! - Resource descriptor builders (route, image stream, build config, deployment, service)
//! - The `Cluster` and `Deployer` traits
//! - The reconciler that applies and persists resource definitions

pub mod app;
pub mod capability;
pub mod cluster;
pub mod deployer;
pub mod env;
pub mod error;
pub mod id;
pub mod reconcile;
pub mod resource;

pub use app::ApplicationIdentity;
pub use capability::{AddOn, Capabilities, Capability, Layer};
pub use cluster::{BuildPhase, BuildRun, BuildUpdate, BuildWatch, Cluster};
pub use deployer::{DeployContext, Deployer, DeployerDescriptor};
pub use env::EnvironmentMap;
pub use error::{Error, Result};
pub use id::DeployId;
pub use reconcile::{AppliedResource, Reconciler};
pub use resource::{ResourceDefinition, ResourceKind};
