//! Deployer plugins for Launchpad.
//!
//! - `registry`: matches injected deployers to detected capabilities and
//!   folds the environment they contribute
//! - `catalog`: deployers declared in `launchpad.kdl`

pub mod catalog;
pub mod registry;

pub use catalog::CatalogDeployer;
pub use launchpad_core::deployer::{DeployContext, Deployer, DeployerDescriptor};
pub use registry::{
    DISABLE_ALL, DeployerMatch, DeployerRegistry, DisabledSet, PlannedMatch, Resolution,
    ResolveObserver, ResolveRequest,
};
