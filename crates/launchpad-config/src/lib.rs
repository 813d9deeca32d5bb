//! KDL configuration parsing for Launchpad.
//!
//! This crate handles parsing of:
//! - Deploy requests (launchpad.kdl)
//! - The deployer catalog declared alongside a request
//! - Variable interpolation in catalog environment values

pub mod catalog;
pub mod error;
mod nodes;
pub mod request;
pub mod variables;

pub use catalog::{BackingService, CatalogEntry};
pub use error::{ConfigError, ConfigResult};
pub use request::{ApplicationConfig, ClusterConfig, DeployConfig, load_config, parse_config};
pub use variables::{VariableContext, VariableContextBuilder};
