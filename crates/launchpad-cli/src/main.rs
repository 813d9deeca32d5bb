//! Launchpad CLI tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::deploy::Overrides;

#[derive(Parser)]
#[command(name = "launchpad")]
#[command(about = "Deploy a provisioned application server to OpenShift", long_about = None)]
struct Cli {
    /// Log progress of each deploy step
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and roll out the application on the cluster
    Deploy {
        /// Path to the configuration file
        #[arg(short, long, default_value = "launchpad.kdl")]
        config: PathBuf,
        /// Application artifact, e.g. ROOT.war
        #[arg(long)]
        artifact: Option<String>,
        /// Resource name for the application
        #[arg(long)]
        name: Option<String>,
        /// Provisioned server directory to build from
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Run two replicas
        #[arg(long)]
        ha: bool,
        /// Target namespace
        #[arg(short, long, env = "LAUNCHPAD_NAMESPACE")]
        namespace: Option<String>,
        /// Extra environment variable, applied last
        #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = commands::parse_env_pair)]
        env: Vec<(String, String)>,
        /// Deployer to run inert, or ALL
        #[arg(long = "disable-deployer", value_name = "NAME")]
        disable_deployer: Vec<String>,
    },
    /// Validate a configuration file without contacting the cluster
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "launchpad.kdl")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Deploy {
            config,
            artifact,
            name,
            output_dir,
            ha,
            namespace,
            env,
            disable_deployer,
        } => {
            let overrides = Overrides {
                artifact,
                name,
                output_dir,
                ha,
                namespace,
                extra_env: env,
                disabled_deployers: disable_deployer,
            };
            commands::deploy::run(&config, overrides).await?;
        }
        Commands::Validate { path } => {
            commands::validate::run(&path)?;
        }
    }

    Ok(())
}
