//! Application identity.
//!
//! The application name doubles as the cluster resource name for every
//! resource Launchpad applies, so it must be a valid DNS-1035 label and must
//! stay stable across redeploys of the same artifact.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::{Error, Result};

/// Artifact name served at the route root instead of under `/<name>`.
pub const ROOT_ARTIFACT: &str = "ROOT.war";

const MAX_NAME_LEN: usize = 63;

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").unwrap());

/// Identity of the application being deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationIdentity {
    name: String,
    artifact: String,
    ha: bool,
}

impl ApplicationIdentity {
    /// Create an identity with an explicit resource name.
    pub fn new(name: impl Into<String>, artifact: impl Into<String>, ha: bool) -> Result<Self> {
        let name = name.into();
        validate_resource_name(&name)?;
        Ok(Self {
            name,
            artifact: artifact.into(),
            ha,
        })
    }

    /// Derive the resource name from the artifact file name.
    ///
    /// `ROOT.war` becomes `root`, `My_Shop-1.0.war` becomes `my-shop-1-0`.
    pub fn from_artifact(artifact: impl Into<String>, ha: bool) -> Result<Self> {
        let artifact = artifact.into();
        let name = derive_name(&artifact);
        Self::new(name, artifact, ha)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    pub fn is_ha(&self) -> bool {
        self.ha
    }

    /// Replica count for the application deployment.
    pub fn replicas(&self) -> i32 {
        if self.ha { 2 } else { 1 }
    }

    /// Path suffix under the route host where the application is served.
    pub fn route_path(&self) -> String {
        if self.artifact == ROOT_ARTIFACT {
            String::new()
        } else {
            format!("/{}", self.name)
        }
    }
}

/// Check that `name` is usable as a cluster resource name.
pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(Error::Config(format!(
            "invalid resource name '{}': longer than {} characters",
            name, MAX_NAME_LEN
        )));
    }
    if !NAME_REGEX.is_match(name) {
        return Err(Error::Config(format!(
            "invalid resource name '{}': must be lowercase alphanumeric or '-', \
             start with a letter and end with an alphanumeric character",
            name
        )));
    }
    Ok(())
}

fn derive_name(artifact: &str) -> String {
    let file_name = artifact.rsplit(['/', '\\']).next().unwrap_or(artifact);
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => file_name,
    };

    let mut name = String::with_capacity(stem.len());
    for c in stem.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            name.push(c);
        } else if !name.ends_with('-') {
            name.push('-');
        }
    }

    let mut name = name.trim_matches('-').to_string();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "app-");
    }
    name.truncate(MAX_NAME_LEN);
    name.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replicas_follow_ha_flag() {
        let single = ApplicationIdentity::new("shop", "shop.war", false).unwrap();
        let ha = ApplicationIdentity::new("shop", "shop.war", true).unwrap();
        assert_eq!(single.replicas(), 1);
        assert_eq!(ha.replicas(), 2);
    }

    #[test]
    fn test_root_artifact_has_empty_path() {
        let app = ApplicationIdentity::from_artifact("ROOT.war", false).unwrap();
        assert_eq!(app.name(), "root");
        assert_eq!(app.route_path(), "");
    }

    #[test]
    fn test_named_artifact_path() {
        let app = ApplicationIdentity::from_artifact("myapp", true).unwrap();
        assert_eq!(app.name(), "myapp");
        assert_eq!(app.route_path(), "/myapp");
    }

    #[test]
    fn test_derive_name_normalizes() {
        assert_eq!(derive_name("target/My_Shop-1.0.war"), "my-shop-1-0");
        assert_eq!(derive_name("kitchen-sink.ear"), "kitchen-sink");
        assert_eq!(derive_name("42.war"), "app-42");
        assert_eq!(derive_name("--x--.war"), "x");
    }

    #[test]
    fn test_derived_name_is_stable() {
        let first = ApplicationIdentity::from_artifact("orders.war", false).unwrap();
        let second = ApplicationIdentity::from_artifact("orders.war", true).unwrap();
        assert_eq!(first.name(), second.name());
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(matches!(
            ApplicationIdentity::new("Shop", "shop.war", false),
            Err(Error::Config(_))
        ));
        assert!(ApplicationIdentity::new("shop-", "shop.war", false).is_err());
        assert!(ApplicationIdentity::new("", "shop.war", false).is_err());
        assert!(ApplicationIdentity::new("a".repeat(64), "shop.war", false).is_err());
        assert!(ApplicationIdentity::from_artifact("___.war", false).is_err());
    }
}
