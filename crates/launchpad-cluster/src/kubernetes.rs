//! Kubernetes cluster implementation.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery::ApiResource;
use kube::runtime::wait::await_condition;
use kube::runtime::watcher::{self, Event, watcher};
use kube::Client;
use launchpad_core::resource::MANAGER;
use launchpad_core::{
    BuildRun, BuildWatch, Cluster, Error, ResourceDefinition, ResourceKind, Result,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::readiness::{build_update, is_deployment_rolled_out};

const BUILD_GROUP: &str = "build.openshift.io";

/// Cluster backed by a `kube` client, scoped to one namespace.
pub struct KubeCluster {
    client: Client,
    namespace: String,
}

impl KubeCluster {
    /// Connect with the inferred kubeconfig or in-cluster configuration.
    /// Without an explicit namespace the client's default is used.
    pub async fn connect(namespace: Option<String>) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::Cluster(format!("Failed to create cluster client: {}", e)))?;
        let namespace = namespace.unwrap_or_else(|| client.default_namespace().to_string());
        Ok(Self { client, namespace })
    }

    pub fn with_client(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn dynamic_api(&self, kind: ResourceKind) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &api_resource(kind))
    }

    fn builds_api(&self) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(BUILD_GROUP, "v1", "Build");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "builds");
        Api::namespaced_with(self.client.clone(), &self.namespace, &resource)
    }
}

pub(crate) fn api_resource(kind: ResourceKind) -> ApiResource {
    let gvk = GroupVersionKind::gvk(kind.group(), kind.version(), kind.kind());
    ApiResource::from_gvk_with_plural(&gvk, kind.plural())
}

pub(crate) fn instantiate_binary_path(namespace: &str, build_config: &str) -> String {
    format!(
        "/apis/{}/v1/namespaces/{}/buildconfigs/{}/instantiatebinary",
        BUILD_GROUP, namespace, build_config
    )
}

#[async_trait]
impl Cluster for KubeCluster {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn server_version(&self) -> Result<String> {
        let info = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| Error::Cluster(format!("Failed to reach API server: {}", e)))?;
        Ok(info.git_version)
    }

    async fn apply(&self, resource: &ResourceDefinition) -> Result<Value> {
        let api = self.dynamic_api(resource.kind());
        let params = PatchParams::apply(MANAGER).force();
        let applied = api
            .patch(resource.name(), &params, &Patch::Apply(resource.manifest()))
            .await
            .map_err(|e| {
                Error::Cluster(format!(
                    "Failed to apply {} {}: {}",
                    resource.kind(),
                    resource.name(),
                    e
                ))
            })?;
        debug!(
            kind = %resource.kind(),
            name = %resource.name(),
            namespace = %self.namespace,
            "Applied resource"
        );
        Ok(serde_json::to_value(applied)?)
    }

    async fn get(&self, kind: ResourceKind, name: &str) -> Result<Option<Value>> {
        let object = self
            .dynamic_api(kind)
            .get_opt(name)
            .await
            .map_err(|e| Error::Cluster(format!("Failed to get {} {}: {}", kind, name, e)))?;
        object
            .map(serde_json::to_value)
            .transpose()
            .map_err(Error::from)
    }

    async fn instantiate_binary(&self, build_config: &str, archive: Bytes) -> Result<BuildRun> {
        let path = instantiate_binary_path(&self.namespace, build_config);
        info!(build_config = %build_config, bytes = archive.len(), "Submitting binary build");

        let request = http::Request::post(path)
            .header(http::header::CONTENT_TYPE, "application/octet-stream")
            .body(archive.to_vec())
            .map_err(|e| Error::Internal(format!("Failed to build request: {}", e)))?;
        let build: Value = self.client.request(request).await.map_err(|e| {
            Error::Cluster(format!(
                "Failed to instantiate build from {}: {}",
                build_config, e
            ))
        })?;

        let name = build["metadata"]["name"]
            .as_str()
            .ok_or_else(|| Error::Cluster("Instantiated build has no name".to_string()))?;
        Ok(BuildRun {
            name: name.to_string(),
            build_config: build_config.to_string(),
        })
    }

    async fn watch_build(&self, run: &BuildRun) -> Result<BuildWatch> {
        let config = watcher::Config::default().fields(&format!("metadata.name={}", run.name));
        let build = run.name.clone();

        let stream = watcher(self.builds_api(), config)
            .filter_map(move |event| {
                let build = build.clone();
                async move {
                    match event {
                        Ok(Event::Apply(obj)) | Ok(Event::InitApply(obj)) => {
                            Some(Ok(build_update(&obj.data)))
                        }
                        Ok(Event::Delete(_)) => Some(Err(Error::Cluster(format!(
                            "Build {} was deleted while waiting",
                            build
                        )))),
                        Ok(Event::Init) | Ok(Event::InitDone) => None,
                        Err(e) => {
                            warn!(build = %build, error = %e, "Build watch error");
                            Some(Err(Error::Cluster(format!(
                                "Watch on build {} failed: {}",
                                build, e
                            ))))
                        }
                    }
                }
            })
            .boxed();

        Ok(BuildWatch::new(&run.name, stream))
    }

    async fn wait_until_ready(
        &self,
        kind: ResourceKind,
        name: &str,
        timeout: Duration,
    ) -> Result<()> {
        if kind != ResourceKind::Deployment {
            return Err(Error::Internal(format!(
                "Readiness wait is not supported for {}",
                kind
            )));
        }

        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let condition = |d: Option<&Deployment>| d.is_some_and(is_deployment_rolled_out);

        match tokio::time::timeout(timeout, await_condition(api, name, condition)).await {
            Ok(Ok(_)) => {
                info!(deployment = %name, "Rollout complete");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Cluster(format!(
                "Failed waiting for deployment {}: {}",
                name, e
            ))),
            Err(_) => Err(Error::Timeout(format!(
                "Deployment {} not ready after {}s",
                name,
                timeout.as_secs()
            ))),
        }
    }
}
