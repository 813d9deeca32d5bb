//! Deployer catalog entries.
//!
//! ```kdl
//! deployer "postgresql" {
//!     layers "postgresql-datasource" "postgresql-driver"
//!     add-on-family "database"
//!     add-ons "postgresql"
//!     image "quay.io/sclorg/postgresql-15-c9s"
//!     port 5432
//!     env {
//!         POSTGRESQL_SERVICE_HOST "${service.name}"
//!     }
//! }
//! ```

use kdl::KdlNode;
use launchpad_core::app::validate_resource_name;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::nodes::{
    get_all_string_args, get_first_string_arg, get_positive_integer, get_string_map,
    require_string_arg,
};
use crate::{ConfigError, ConfigResult};

/// A deployer declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub layers: BTreeSet<String>,
    pub add_on_family: Option<String>,
    pub add_ons: BTreeSet<String>,
    /// Environment contributed to the application; values may use variables.
    pub env: BTreeMap<String, String>,
    pub backing: Option<BackingService>,
}

/// Container the deployer runs next to the application when active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackingService {
    pub image: String,
    pub port: i32,
    pub env: BTreeMap<String, String>,
}

pub(crate) fn parse_deployer(node: &KdlNode) -> ConfigResult<CatalogEntry> {
    let name = require_string_arg(node, "deployer name")?;

    let mut layers = BTreeSet::new();
    let mut add_on_family = None;
    let mut add_ons = BTreeSet::new();
    let mut env = BTreeMap::new();
    let mut image = None;
    let mut port = None;
    let mut service_env = BTreeMap::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "layers" | "layer" => layers.extend(get_all_string_args(child)),
                "add-on-family" => add_on_family = get_first_string_arg(child),
                "add-ons" | "add-on" => add_ons.extend(get_all_string_args(child)),
                "env" => env = get_string_map(child)?,
                "image" => image = get_first_string_arg(child),
                "port" => {
                    let value = get_positive_integer(child, "deployer port")?;
                    let value = i32::try_from(value)
                        .ok()
                        .filter(|p| *p <= 65535)
                        .ok_or_else(|| ConfigError::InvalidValue {
                            field: format!("port of deployer '{}'", name),
                            message: format!("{} is not a valid port", value),
                        })?;
                    port = Some(value);
                }
                "service-env" => service_env = get_string_map(child)?,
                _ => {} // Ignore unknown nodes
            }
        }
    }

    if !add_ons.is_empty() && add_on_family.is_none() {
        return Err(ConfigError::MissingField(format!(
            "add-on-family for deployer '{}'",
            name
        )));
    }

    let backing = match (image, port) {
        (Some(image), Some(port)) => {
            // The deployer name becomes part of the backing resource names
            validate_resource_name(&name).map_err(|e| ConfigError::InvalidValue {
                field: format!("name of deployer '{}'", name),
                message: e.to_string(),
            })?;
            Some(BackingService {
            image,
            port,
                env: service_env,
            })
        }
        (None, None) => None,
        (Some(_), None) => {
            return Err(ConfigError::MissingField(format!(
                "port for deployer '{}'",
                name
            )));
        }
        (None, Some(_)) => {
            return Err(ConfigError::MissingField(format!(
                "image for deployer '{}'",
                name
            )));
        }
    };

    Ok(CatalogEntry {
        name,
        layers,
        add_on_family,
        add_ons,
        env,
        backing,
    })
}
