//! Offline check of a deploy config.

use std::path::Path;

use anyhow::{Context, Result};
use launchpad_config::{DeployConfig, load_config};
use launchpad_core::EnvironmentMap;
use launchpad_deployer::DeployerRegistry;

/// Stands in for the route host, which is only known once the route exists.
pub const PREVIEW_HOST: &str = "<route-host>";

/// What a deploy of this config would do, computed without a cluster.
#[derive(Debug)]
pub struct Preview {
    pub app_name: String,
    pub replicas: i32,
    pub engaged: Vec<(String, String, bool)>,
    pub env: EnvironmentMap,
}

/// Check the config and the disabled deployers, then preview the environment
/// every matching deployer would contribute.
pub fn preview(config: &DeployConfig, registry: &DeployerRegistry) -> Result<Preview> {
    let app = config
        .application
        .identity()
        .context("Invalid application name")?;
    let disabled = registry.validate_disabled(&config.disabled_deployers)?;
    registry.preflight(&app, &config.capabilities, &disabled)?;

    let mut env = EnvironmentMap::new();
    let mut engaged = Vec::new();
    for planned in registry.plan(&config.capabilities, &disabled) {
        let contributed =
            planned
                .deployer
                .inert_deploy(PREVIEW_HOST, app.name(), &planned.capability, &config.env);
        env = env.merge(contributed);
        engaged.push((
            planned.deployer.name().to_string(),
            planned.capability.to_string(),
            planned.disabled,
        ));
    }

    Ok(Preview {
        app_name: app.name().to_string(),
        replicas: app.replicas(),
        engaged,
        env: env.merge(config.extra_env.clone()),
    })
}

pub fn run(path: &Path) -> Result<()> {
    let config = load_config(path)
        .with_context(|| format!("Failed to load config: {}", path.display()))?;
    let registry = super::build_registry(&config)?;
    let preview = preview(&config, &registry)?;

    println!("Configuration is valid");
    println!("  application: {} ({} replicas)", preview.app_name, preview.replicas);
    println!("  deployers registered: {}", registry.len());

    if preview.engaged.is_empty() {
        println!("  no deployer matches the requested capabilities");
    }
    for (deployer, capability, disabled) in &preview.engaged {
        let state = if *disabled { "disabled" } else { "active" };
        println!("  {} -> {} ({})", capability, deployer, state);
    }

    if !preview.env.is_empty() {
        println!("Environment preview:");
        for (key, value) in &preview.env {
            println!("  {}={}", key, value);
        }
    }

    Ok(())
}
