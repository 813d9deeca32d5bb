//! Deploy request parsing (`launchpad.kdl`).
//!
//! ```kdl
//! application "shop.war" {
//!     name "shop"
//!     ha
//! }
//! output-dir "target/server"
//!
//! cluster {
//!     namespace "demo"
//!     builder-image "quay.io/wildfly/wildfly-s2i:latest"
//!     rollout-timeout 300
//! }
//!
//! layers "postgresql-datasource" "microprofile-health"
//! add-on "database" "postgresql"
//!
//! extra-env {
//!     JAVA_OPTS_APPEND "-Xmx512m"
//! }
//! disable-deployer "keycloak"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use kdl::{KdlDocument, KdlNode};
use launchpad_core::cluster::DEFAULT_ARCHIVE;
use launchpad_core::reconcile::DEFAULT_ROLLOUT_TIMEOUT;
use launchpad_core::resource::BuilderSettings;
use launchpad_core::{ApplicationIdentity, Capabilities, EnvironmentMap};

use crate::catalog::{CatalogEntry, parse_deployer};
use crate::nodes::{
    get_all_string_args, get_first_string_arg, get_flag, get_positive_integer, get_string_map,
    require_string_arg,
};
use crate::{ConfigError, ConfigResult};

pub const DEFAULT_OUTPUT_DIR: &str = "target/server";

/// The application being deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationConfig {
    pub artifact: String,
    /// Explicit resource name; derived from the artifact when absent.
    pub name: Option<String>,
    pub ha: bool,
}

impl ApplicationConfig {
    pub fn identity(&self) -> launchpad_core::Result<ApplicationIdentity> {
        match &self.name {
            Some(name) => ApplicationIdentity::new(name, &self.artifact, self.ha),
            None => ApplicationIdentity::from_artifact(&self.artifact, self.ha),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub namespace: Option<String>,
    pub builder: BuilderSettings,
    pub rollout_timeout: Duration,
    pub build_timeout: Option<Duration>,
    pub archive_path: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            builder: BuilderSettings::default(),
            rollout_timeout: DEFAULT_ROLLOUT_TIMEOUT,
            build_timeout: None,
            archive_path: PathBuf::from(DEFAULT_ARCHIVE),
        }
    }
}

/// A fully parsed deploy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub application: ApplicationConfig,
    pub output_dir: PathBuf,
    pub cluster: ClusterConfig,
    pub capabilities: Capabilities,
    /// Handed to deployers as context; not applied to the application.
    pub env: EnvironmentMap,
    /// Applied to the application last, overriding deployer values.
    pub extra_env: EnvironmentMap,
    pub disabled_deployers: BTreeSet<String>,
    pub deployers: Vec<CatalogEntry>,
}

/// Load a deploy request from a file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<DeployConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse a deploy request from KDL text.
pub fn parse_config(kdl: &str) -> ConfigResult<DeployConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut application = None;
    let mut output_dir = PathBuf::from(DEFAULT_OUTPUT_DIR);
    let mut cluster = ClusterConfig::default();
    let mut capabilities = Capabilities::new();
    let mut env = BTreeMap::new();
    let mut extra_env = BTreeMap::new();
    let mut disabled_deployers = BTreeSet::new();
    let mut deployers: Vec<CatalogEntry> = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "application" => {
                application = Some(parse_application(node)?);
            }
            "output-dir" => {
                output_dir = PathBuf::from(require_string_arg(node, "output-dir")?);
            }
            "cluster" => {
                cluster = parse_cluster(node)?;
            }
            "layers" | "layer" => {
                for layer in get_all_string_args(node) {
                    capabilities = capabilities.with_layer(layer);
                }
            }
            "add-on" => {
                let args = get_all_string_args(node);
                let [family, name] = args.as_slice() else {
                    return Err(ConfigError::InvalidValue {
                        field: "add-on".to_string(),
                        message: "expected a family and a name".to_string(),
                    });
                };
                capabilities = capabilities.with_add_on(family, name);
            }
            "env" => {
                env.extend(get_string_map(node)?);
            }
            "extra-env" => {
                extra_env.extend(get_string_map(node)?);
            }
            "disable-deployer" | "disable-deployers" => {
                disabled_deployers.extend(get_all_string_args(node));
            }
            "deployer" => {
                let entry = parse_deployer(node)?;
                if deployers.iter().any(|d| d.name == entry.name) {
                    return Err(ConfigError::Duplicate(format!("deployer '{}'", entry.name)));
                }
                deployers.push(entry);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    let application =
        application.ok_or_else(|| ConfigError::MissingField("application".to_string()))?;

    Ok(DeployConfig {
        application,
        output_dir,
        cluster,
        capabilities,
        env: env.into(),
        extra_env: extra_env.into(),
        disabled_deployers,
        deployers,
    })
}

fn parse_application(node: &KdlNode) -> ConfigResult<ApplicationConfig> {
    let artifact = require_string_arg(node, "application artifact")?;
    let mut name = None;
    let mut ha = false;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "name" => name = Some(require_string_arg(child, "application name")?),
                "ha" => ha = get_flag(child)?,
                _ => {}
            }
        }
    }

    Ok(ApplicationConfig { artifact, name, ha })
}

fn parse_cluster(node: &KdlNode) -> ConfigResult<ClusterConfig> {
    let mut cluster = ClusterConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "namespace" => cluster.namespace = get_first_string_arg(child),
                "builder-image" => {
                    cluster.builder.image = require_string_arg(child, "builder-image")?;
                }
                "builder-env" => {
                    // Declared values are layered over the builder defaults
                    let declared: EnvironmentMap = get_string_map(child)?.into();
                    cluster.builder.env = std::mem::take(&mut cluster.builder.env).merge(declared);
                }
                "rollout-timeout" => {
                    let secs = get_positive_integer(child, "rollout-timeout")?;
                    cluster.rollout_timeout = Duration::from_secs(secs);
                }
                "build-timeout" => {
                    let secs = get_positive_integer(child, "build-timeout")?;
                    cluster.build_timeout = Some(Duration::from_secs(secs));
                }
                "archive" => {
                    cluster.archive_path = PathBuf::from(require_string_arg(child, "archive")?);
                }
                _ => {}
            }
        }
    }

    Ok(cluster)
}
