//! Deployers declared in configuration.
//!
//! A catalog deployer contributes an interpolated environment and, when the
//! entry names an image, runs a backing container next to the application.

use async_trait::async_trait;
use launchpad_config::{CatalogEntry, VariableContext, VariableContextBuilder};
use launchpad_core::app::validate_resource_name;
use launchpad_core::{
    ApplicationIdentity, Capability, DeployContext, Deployer, DeployerDescriptor,
    EnvironmentMap, Result, resource,
};
use tracing::info;

pub struct CatalogDeployer {
    entry: CatalogEntry,
    descriptor: DeployerDescriptor,
}

impl CatalogDeployer {
    pub fn new(entry: CatalogEntry) -> Self {
        let mut descriptor =
            DeployerDescriptor::new(&entry.name).with_layers(entry.layers.iter().cloned());
        if let Some(family) = &entry.add_on_family {
            descriptor = descriptor.with_add_ons(family, entry.add_ons.iter().cloned());
        }
        Self { entry, descriptor }
    }

    pub fn entry(&self) -> &CatalogEntry {
        &self.entry
    }

    fn variables(
        &self,
        host: &str,
        app_name: &str,
        artifact: &str,
        capability: &Capability,
        env: &EnvironmentMap,
    ) -> VariableContext {
        VariableContextBuilder::new()
            .with_route_host(host)
            .with_app(app_name, artifact)
            .with_deployer(&self.entry.name)
            .with_capability(capability.id())
            .with_env_map(env.iter())
            .build()
    }
}

#[async_trait]
impl Deployer for CatalogDeployer {
    fn descriptor(&self) -> &DeployerDescriptor {
        &self.descriptor
    }

    /// Backing resources are named `<app>-<deployer>`, which must stay a
    /// valid resource name.
    fn preflight(&self, app: &ApplicationIdentity) -> Result<()> {
        if self.entry.backing.is_some() {
            validate_resource_name(&format!("{}-{}", app.name(), self.entry.name))?;
        }
        Ok(())
    }

    async fn deploy(&self, ctx: DeployContext<'_>) -> Result<EnvironmentMap> {
        let vars = self.variables(
            ctx.host,
            ctx.app.name(),
            ctx.app.artifact(),
            ctx.capability,
            ctx.env,
        );

        if let Some(backing) = &self.entry.backing {
            let name = vars.service_name();
            let service_env: EnvironmentMap = vars.interpolate_map(&backing.env).into();
            info!(
                deployer = %self.entry.name,
                service = %name,
                image = %backing.image,
                "Provisioning backing service"
            );
            ctx.reconciler
                .apply(&resource::backing_deployment(
                    ctx.app,
                    &name,
                    &backing.image,
                    backing.port,
                    &service_env,
                )?)
                .await?;
            ctx.reconciler
                .apply(&resource::backing_service(ctx.app, &name, backing.port)?)
                .await?;
        }

        Ok(vars.interpolate_map(&self.entry.env).into())
    }

    fn inert_deploy(
        &self,
        host: &str,
        app_name: &str,
        capability: &Capability,
        env: &EnvironmentMap,
    ) -> EnvironmentMap {
        self.variables(host, app_name, "", capability, env)
            .interpolate_map(&self.entry.env)
            .into()
    }
}
