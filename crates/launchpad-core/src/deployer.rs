//! Deployer plugin contract.
//!
//! A deployer provisions (or just documents) the environment an application
//! needs to reach one kind of backing capability, such as a datastore.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{
    AddOn, ApplicationIdentity, Capabilities, Capability, EnvironmentMap, Layer, Reconciler,
    Result,
};

/// What a deployer supports. Registered once and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployerDescriptor {
    /// Unique key across the registry.
    pub name: String,
    pub layers: BTreeSet<String>,
    pub add_on_family: Option<String>,
    pub add_ons: BTreeSet<String>,
}

impl DeployerDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.layers.extend(layers.into_iter().map(Into::into));
        self
    }

    pub fn with_add_ons<I, S>(mut self, family: impl Into<String>, add_ons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_on_family = Some(family.into());
        self.add_ons.extend(add_ons.into_iter().map(Into::into));
        self
    }

    pub fn matches_layer(&self, layer: &Layer) -> bool {
        self.layers.contains(&layer.name)
    }

    pub fn matches_add_on(&self, add_on: &AddOn) -> bool {
        self.add_on_family.as_deref() == Some(add_on.family.as_str())
            && self.add_ons.contains(&add_on.name)
    }

    /// The capability this deployer engages on, if any.
    ///
    /// Layers are tried first; add-ons only when no layer matched. The first
    /// match in sorted capability order wins.
    pub fn first_match(&self, capabilities: &Capabilities) -> Option<Capability> {
        capabilities
            .layers
            .iter()
            .find(|layer| self.matches_layer(layer))
            .map(|layer| Capability::Layer(layer.clone()))
            .or_else(|| {
                capabilities
                    .add_ons
                    .iter()
                    .find(|add_on| self.matches_add_on(add_on))
                    .map(|add_on| Capability::AddOn(add_on.clone()))
            })
    }
}

/// Inputs handed to an active deployer.
pub struct DeployContext<'a> {
    /// Applies and persists any resources the deployer needs.
    pub reconciler: &'a Reconciler,
    pub app: &'a ApplicationIdentity,
    /// Host of the application route.
    pub host: &'a str,
    pub capability: &'a Capability,
    /// Environment supplied with the deploy request.
    pub env: &'a EnvironmentMap,
}

/// Trait for deployer plugins.
#[async_trait]
pub trait Deployer: Send + Sync {
    fn descriptor(&self) -> &DeployerDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Reject inputs the active variant could not deploy, before anything is
    /// applied to the cluster.
    fn preflight(&self, _app: &ApplicationIdentity) -> Result<()> {
        Ok(())
    }

    /// Provision the capability; may apply cluster resources. Returns the
    /// environment the application needs to reach it.
    async fn deploy(&self, ctx: DeployContext<'_>) -> Result<EnvironmentMap>;

    /// Environment the active variant would set, without side effects.
    fn inert_deploy(
        &self,
        host: &str,
        app_name: &str,
        capability: &Capability,
        env: &EnvironmentMap,
    ) -> EnvironmentMap;
}
