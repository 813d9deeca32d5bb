//! Deployer registry and resolver.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use launchpad_core::{
    ApplicationIdentity, Capabilities, Capability, DeployContext, Deployer, EnvironmentMap, Error,
    Reconciler, Result,
};
use tracing::{info, warn};

/// Disabling this name disables every registered deployer.
pub const DISABLE_ALL: &str = "ALL";

/// Deployers that run their inert variant instead of the active one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisabledSet {
    all: bool,
    names: BTreeSet<String>,
}

impl DisabledSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            all: true,
            names: BTreeSet::new(),
        }
    }

    pub fn contains(&self, deployer: &str) -> bool {
        self.all || self.names.contains(deployer)
    }

    pub fn is_all(&self) -> bool {
        self.all
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.names.is_empty()
    }
}

/// A deployer that will engage, before anything runs.
#[derive(Clone)]
pub struct PlannedMatch {
    pub deployer: Arc<dyn Deployer>,
    pub capability: Capability,
    pub disabled: bool,
}

/// A deployer that engaged during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployerMatch {
    pub deployer: String,
    pub capability: Capability,
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Deployer contributions folded in order, then the extra variables.
    pub env: EnvironmentMap,
    pub matches: Vec<DeployerMatch>,
}

impl Resolution {
    /// True when some values came from an inert deployer and may need
    /// updating by hand.
    pub fn needs_review(&self) -> bool {
        self.matches.iter().any(|m| m.disabled)
    }
}

/// Told about each match before its deployer runs.
#[async_trait]
pub trait ResolveObserver: Send + Sync {
    async fn engaging(&self, matched: &DeployerMatch);
}

#[async_trait]
impl ResolveObserver for () {
    async fn engaging(&self, _matched: &DeployerMatch) {}
}

/// Inputs to one resolution pass.
pub struct ResolveRequest<'a> {
    pub reconciler: &'a Reconciler,
    pub app: &'a ApplicationIdentity,
    pub host: &'a str,
    pub capabilities: &'a Capabilities,
    pub disabled: &'a DisabledSet,
    /// Handed to every deployer; not applied to the application itself.
    pub env: &'a EnvironmentMap,
    /// Merged last, overriding deployer values.
    pub extra_env: &'a EnvironmentMap,
    pub observer: &'a dyn ResolveObserver,
}

/// The closed set of deployers available to one run, in injection order.
pub struct DeployerRegistry {
    deployers: Vec<Arc<dyn Deployer>>,
}

impl DeployerRegistry {
    pub fn new(deployers: Vec<Arc<dyn Deployer>>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for deployer in &deployers {
            if !seen.insert(deployer.name().to_string()) {
                return Err(Error::Config(format!(
                    "deployer '{}' is registered more than once",
                    deployer.name()
                )));
            }
        }
        Ok(Self { deployers })
    }

    pub fn empty() -> Self {
        Self {
            deployers: Vec::new(),
        }
    }

    pub fn deployers(&self) -> &[Arc<dyn Deployer>] {
        &self.deployers
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.deployers.iter().map(|d| d.name())
    }

    pub fn len(&self) -> usize {
        self.deployers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deployers.is_empty()
    }

    /// Check requested disabled names against the registry.
    ///
    /// `ALL` disables everything; any other name must be registered.
    pub fn validate_disabled<I, S>(&self, names: I) -> Result<DisabledSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut disabled = DisabledSet::none();
        for name in names {
            let name = name.as_ref();
            if name == DISABLE_ALL {
                disabled.all = true;
                continue;
            }
            if !self.names().any(|known| known == name) {
                let known: Vec<&str> = self.names().collect();
                return Err(Error::Config(format!(
                    "invalid deployer '{}' to disable; known deployers: [{}]",
                    name,
                    known.join(", ")
                )));
            }
            disabled.names.insert(name.to_string());
        }
        Ok(disabled)
    }

    /// Deployers that would engage on `capabilities`, at most one capability
    /// each. Has no side effects.
    pub fn plan(&self, capabilities: &Capabilities, disabled: &DisabledSet) -> Vec<PlannedMatch> {
        self.deployers
            .iter()
            .filter_map(|deployer| {
                deployer
                    .descriptor()
                    .first_match(capabilities)
                    .map(|capability| PlannedMatch {
                        deployer: deployer.clone(),
                        capability,
                        disabled: disabled.contains(deployer.name()),
                    })
            })
            .collect()
    }

    /// Run each active match's preflight check. Touches nothing remote.
    pub fn preflight(
        &self,
        app: &ApplicationIdentity,
        capabilities: &Capabilities,
        disabled: &DisabledSet,
    ) -> Result<()> {
        self.plan(capabilities, disabled)
            .iter()
            .filter(|planned| !planned.disabled)
            .try_for_each(|planned| planned.deployer.preflight(app))
    }

    /// Run every matching deployer and fold the environment they contribute.
    pub async fn resolve(&self, request: ResolveRequest<'_>) -> Result<Resolution> {
        let planned = self.plan(request.capabilities, request.disabled);

        let mut env = EnvironmentMap::new();
        let mut matches = Vec::with_capacity(planned.len());

        for PlannedMatch {
            deployer,
            capability,
            disabled,
        } in planned
        {
            let matched = DeployerMatch {
                deployer: deployer.name().to_string(),
                capability,
                disabled,
            };
            request.observer.engaging(&matched).await;
            let capability = &matched.capability;

            let contributed = if disabled {
                warn!(
                    deployer = %deployer.name(),
                    capability = %capability,
                    "Deployer disabled; only reporting its environment"
                );
                deployer.inert_deploy(
                    request.host,
                    request.app.name(),
                    capability,
                    request.env,
                )
            } else {
                info!(
                    deployer = %deployer.name(),
                    capability = %capability,
                    "Engaging deployer"
                );
                deployer
                    .deploy(DeployContext {
                        reconciler: request.reconciler,
                        app: request.app,
                        host: request.host,
                        capability,
                        env: request.env,
                    })
                    .await?
            };

            env = env.merge(contributed);
            matches.push(matched);
        }

        Ok(Resolution {
            env: env.merge(request.extra_env.clone()),
            matches,
        })
    }
}
