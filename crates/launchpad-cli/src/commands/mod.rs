//! CLI command implementations.

pub mod deploy;
pub mod validate;

use std::sync::Arc;

use anyhow::{Context, Result};
use launchpad_config::DeployConfig;
use launchpad_deployer::{CatalogDeployer, Deployer, DeployerRegistry};

/// Register one catalog deployer per declared entry.
pub fn build_registry(config: &DeployConfig) -> Result<DeployerRegistry> {
    let deployers: Vec<Arc<dyn Deployer>> = config
        .deployers
        .iter()
        .cloned()
        .map(|entry| Arc::new(CatalogDeployer::new(entry)) as Arc<dyn Deployer>)
        .collect();

    DeployerRegistry::new(deployers).context("Invalid deployer catalog")
}

/// Parse a `KEY=VALUE` argument.
pub fn parse_env_pair(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
