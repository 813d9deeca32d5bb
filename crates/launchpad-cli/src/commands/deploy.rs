//! Deploy the application to the cluster.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use launchpad_cluster::KubeCluster;
use launchpad_config::{DeployConfig, load_config};
use launchpad_orchestrator::{DeployEvent, DeployRequest, DeploymentOrchestrator};
use tokio::sync::mpsc;
use tracing::debug;

/// Command line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub artifact: Option<String>,
    pub name: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub ha: bool,
    pub namespace: Option<String>,
    pub extra_env: Vec<(String, String)>,
    pub disabled_deployers: Vec<String>,
}

impl Overrides {
    pub fn apply(self, config: &mut DeployConfig) {
        if let Some(artifact) = self.artifact {
            config.application.artifact = artifact;
        }
        if let Some(name) = self.name {
            config.application.name = Some(name);
        }
        if self.ha {
            config.application.ha = true;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(namespace) = self.namespace {
            config.cluster.namespace = Some(namespace);
        }
        for (key, value) in self.extra_env {
            config.extra_env.insert(key, value);
        }
        config
            .disabled_deployers
            .extend(self.disabled_deployers);
    }
}

/// Translate a parsed config into an orchestrator request.
pub fn build_request(config: &DeployConfig) -> Result<DeployRequest> {
    let app = config
        .application
        .identity()
        .context("Invalid application name")?;

    let mut request = DeployRequest::new(app, &config.output_dir)
        .with_capabilities(config.capabilities.clone())
        .with_env(config.env.clone())
        .with_extra_env(config.extra_env.clone())
        .with_disabled(&config.disabled_deployers)
        .with_archive_path(&config.cluster.archive_path);
    request.builder = config.cluster.builder.clone();
    request.rollout_timeout = config.cluster.rollout_timeout;
    request.build_timeout = config.cluster.build_timeout;

    Ok(request)
}

/// Run a deploy against the current kube context.
pub async fn run(config_path: &Path, overrides: Overrides) -> Result<()> {
    let mut config = load_config(config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;
    overrides.apply(&mut config);

    if !config.output_dir.is_dir() {
        anyhow::bail!(
            "Output directory {} does not exist; build the server first",
            config.output_dir.display()
        );
    }

    let registry = super::build_registry(&config)?;
    let request = build_request(&config)?;
    debug!(
        config = %config_path.display(),
        deployers = registry.len(),
        "Loaded deploy config"
    );

    let cluster = KubeCluster::connect(config.cluster.namespace.clone())
        .await
        .context("Failed to connect to the cluster")?;

    println!(
        "Deploying {} to namespace {}",
        request.app.name(),
        cluster.namespace()
    );
    println!("Output directory: {}\n", config.output_dir.display());

    let orchestrator = DeploymentOrchestrator::new(Arc::new(cluster), registry);
    let (mut rx, handle) = orchestrator.execute(request);

    // Ctrl-C aborts the deploy task, which drops the build watch and the archive.
    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        _ = print_events(&mut rx) => false,
    };
    if interrupted {
        handle.abort();
        let _ = handle.await;
        anyhow::bail!("Deploy interrupted");
    }

    let outcome = handle
        .await
        .context("Deploy task failed")?
        .context("Deploy failed")?;

    let elapsed = outcome.finished_at - outcome.started_at;
    println!("\n--- Deploy {} finished ---", outcome.deploy_id);
    println!("  build:     {}", outcome.build.name);
    println!("  resources: {}", outcome.persisted.len());
    println!("  elapsed:   {}s", elapsed.num_seconds());
    println!("  url:       {}", outcome.url);

    Ok(())
}

async fn print_events(rx: &mut mpsc::Receiver<DeployEvent>) {
    while let Some(event) = rx.recv().await {
        match &event {
            DeployEvent::BuildPhase { .. } => println!("  {}", event),
            DeployEvent::Completed { .. } => println!("\n✓ {}", event),
            _ => println!("{}", event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_config::parse_config;
    use std::time::Duration;

    fn config() -> DeployConfig {
        parse_config(
            r#"
            application "shop.war"
            cluster {
                namespace "demo"
                rollout-timeout 60
            }
            extra-env {
                JAVA_OPTS_APPEND "-Xmx512m"
            }
            disable-deployer "keycloak"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = config();
        Overrides {
            artifact: Some("orders.war".to_string()),
            ha: true,
            namespace: Some("staging".to_string()),
            extra_env: vec![
                ("JAVA_OPTS_APPEND".to_string(), "-Xmx1g".to_string()),
                ("LOG_LEVEL".to_string(), "DEBUG".to_string()),
            ],
            disabled_deployers: vec!["postgresql".to_string()],
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.application.artifact, "orders.war");
        assert!(config.application.ha);
        assert_eq!(config.cluster.namespace.as_deref(), Some("staging"));
        assert_eq!(config.extra_env.get("JAVA_OPTS_APPEND"), Some("-Xmx1g"));
        assert_eq!(config.extra_env.get("LOG_LEVEL"), Some("DEBUG"));
        assert!(config.disabled_deployers.contains("keycloak"));
        assert!(config.disabled_deployers.contains("postgresql"));
    }

    #[test]
    fn test_empty_overrides_keep_config() {
        let mut config = config();
        let before = config.clone();
        Overrides::default().apply(&mut config);
        assert_eq!(config, before);
    }

    #[test]
    fn test_build_request_from_config() {
        let request = build_request(&config()).unwrap();

        assert_eq!(request.app.name(), "shop");
        assert_eq!(request.rollout_timeout, Duration::from_secs(60));
        assert_eq!(request.build_timeout, None);
        assert_eq!(request.extra_env.get("JAVA_OPTS_APPEND"), Some("-Xmx512m"));
        assert!(request.disabled_deployers.contains("keycloak"));
    }

    #[test]
    fn test_build_request_rejects_invalid_name() {
        let mut config = config();
        config.application.name = Some("Bad_Name".to_string());
        assert!(build_request(&config).is_err());
    }
}
