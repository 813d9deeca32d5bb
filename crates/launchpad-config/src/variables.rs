//! Variable interpolation for catalog environment values.
//!
//! Supports variables like:
//! - `${route.host}` - Host assigned to the application route
//! - `${route.url}` - `https://` URL of the application route host
//! - `${app.name}` - Application resource name
//! - `${app.artifact}` - Deployed artifact file name
//! - `${deployer.name}` - Name of the deployer being resolved
//! - `${service.name}` - Name of the deployer's backing service
//! - `${capability}` - Layer or add-on the deployer matched
//! - `${env.VAR_NAME}` - Variable from the deploy request environment

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Values available for interpolation while resolving one deployer.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    pub route_host: String,
    pub app_name: String,
    pub app_artifact: String,
    pub deployer_name: String,
    pub capability: String,
    pub env: BTreeMap<String, String>,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the backing service a catalog deployer creates.
    pub fn service_name(&self) -> String {
        format!("{}-{}", self.app_name, self.deployer_name)
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["route", "host"] => Some(self.route_host.clone()),
            ["route", "url"] => Some(format!("https://{}", self.route_host)),
            ["app", "name"] => Some(self.app_name.clone()),
            ["app", "artifact"] => Some(self.app_artifact.clone()),
            ["deployer", "name"] => Some(self.deployer_name.clone()),
            ["service", "name"] => Some(self.service_name()),
            ["capability"] => Some(self.capability.clone()),
            ["env", name] => self.env.get(*name).cloned(),
            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    /// Unknown variables are left untouched.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// Interpolate every value of a map; keys are kept as-is.
    pub fn interpolate_map(&self, map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.interpolate(v)))
            .collect()
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_route_host(mut self, host: impl Into<String>) -> Self {
        self.ctx.route_host = host.into();
        self
    }

    pub fn with_app(mut self, name: impl Into<String>, artifact: impl Into<String>) -> Self {
        self.ctx.app_name = name.into();
        self.ctx.app_artifact = artifact.into();
        self
    }

    pub fn with_deployer(mut self, name: impl Into<String>) -> Self {
        self.ctx.deployer_name = name.into();
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.ctx.capability = capability.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.env.insert(key.into(), value.into());
        self
    }

    pub fn with_env_map<'a>(mut self, env: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.ctx
            .env
            .extend(env.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
