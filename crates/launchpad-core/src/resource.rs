//! Resource descriptors.
//!
//! Pure builders for the cluster resources an application needs. Nothing in
//! this module talks to the cluster; the reconciler applies what is built
//! here.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSpec, PodTemplateSpec, Probe, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;

use crate::{ApplicationIdentity, EnvironmentMap, Result};

pub const HTTP_PORT: i32 = 8080;
pub const ADMIN_PORT: i32 = 9990;
pub const HTTP_PORT_NAME: &str = "http";
pub const ADMIN_PORT_NAME: &str = "admin";
pub const READINESS_PATH: &str = "/health/ready";
pub const LIVENESS_PATH: &str = "/health/live";

/// Pod selector label keyed to the application name.
pub const APP_LABEL: &str = "app.kubernetes.io/name";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGER: &str = "launchpad";
/// Ties a deployer's backing resources to the application they serve.
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";

pub const DEFAULT_BUILDER_IMAGE: &str = "quay.io/wildfly/wildfly-s2i:latest";

/// The resource kinds Launchpad applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Route,
    ImageStream,
    BuildConfig,
    Deployment,
    Service,
}

impl ResourceKind {
    pub fn group(&self) -> &'static str {
        match self {
            ResourceKind::Route => "route.openshift.io",
            ResourceKind::ImageStream => "image.openshift.io",
            ResourceKind::BuildConfig => "build.openshift.io",
            ResourceKind::Deployment => "apps",
            ResourceKind::Service => "",
        }
    }

    pub fn version(&self) -> &'static str {
        "v1"
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceKind::Route => "route.openshift.io/v1",
            ResourceKind::ImageStream => "image.openshift.io/v1",
            ResourceKind::BuildConfig => "build.openshift.io/v1",
            ResourceKind::Deployment => "apps/v1",
            ResourceKind::Service => "v1",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResourceKind::Route => "Route",
            ResourceKind::ImageStream => "ImageStream",
            ResourceKind::BuildConfig => "BuildConfig",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Route => "routes",
            ResourceKind::ImageStream => "imagestreams",
            ResourceKind::BuildConfig => "buildconfigs",
            ResourceKind::Deployment => "deployments",
            ResourceKind::Service => "services",
        }
    }

    /// Suffix of the persisted `<component>-<suffix>.yaml` file.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            ResourceKind::Route => "route",
            ResourceKind::ImageStream => "image-stream",
            ResourceKind::BuildConfig => "build-config",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Service => "service",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Desired state for one cluster resource, keyed by (kind, name).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceDefinition {
    kind: ResourceKind,
    name: String,
    /// Application or backing component the resource belongs to; names the
    /// persisted file.
    component: String,
    manifest: Value,
}

impl ResourceDefinition {
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        component: impl Into<String>,
        manifest: Value,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            component: component.into(),
            manifest,
        }
    }

    /// Build a definition from a typed `k8s-openapi` resource.
    pub fn from_resource<K: Serialize>(
        kind: ResourceKind,
        name: impl Into<String>,
        component: impl Into<String>,
        resource: &K,
    ) -> Result<Self> {
        Ok(Self::new(
            kind,
            name,
            component,
            serde_json::to_value(resource)?,
        ))
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn manifest(&self) -> &Value {
        &self.manifest
    }

    pub fn file_name(&self) -> String {
        format!("{}-{}.yaml", self.component, self.kind.file_suffix())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.manifest)?)
    }
}

/// Settings for the source-to-image build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderSettings {
    pub image: String,
    pub env: EnvironmentMap,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            image: DEFAULT_BUILDER_IMAGE.to_string(),
            env: EnvironmentMap::new().with("GALLEON_USE_LOCAL_FILE", "true"),
        }
    }
}

pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), name.to_string())])
}

fn metadata_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(name);
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGER.to_string());
    labels
}

pub fn build_config_name(app: &ApplicationIdentity) -> String {
    format!("{}-build", app.name())
}

pub fn image_tag(app: &ApplicationIdentity) -> String {
    format!("{}:latest", app.name())
}

/// Edge-terminated route to the application service.
pub fn route(app: &ApplicationIdentity) -> ResourceDefinition {
    let name = app.name();
    let manifest = json!({
        "apiVersion": ResourceKind::Route.api_version(),
        "kind": ResourceKind::Route.kind(),
        "metadata": {
            "name": name,
            "labels": metadata_labels(name),
        },
        "spec": {
            "to": {
                "kind": "Service",
                "name": name,
                "weight": 100,
            },
            "tls": {
                "termination": "edge",
                "insecureEdgeTerminationPolicy": "Redirect",
            },
        },
    });
    ResourceDefinition::new(ResourceKind::Route, name, name, manifest)
}

/// Image stream the build pushes to; local lookup lets the deployment
/// reference `<name>:latest` directly.
pub fn image_stream(app: &ApplicationIdentity) -> ResourceDefinition {
    let name = app.name();
    let manifest = json!({
        "apiVersion": ResourceKind::ImageStream.api_version(),
        "kind": ResourceKind::ImageStream.kind(),
        "metadata": {
            "name": name,
            "labels": metadata_labels(name),
        },
        "spec": {
            "lookupPolicy": { "local": true },
        },
    });
    ResourceDefinition::new(ResourceKind::ImageStream, name, name, manifest)
}

/// Binary source-to-image build producing `<name>:latest`.
pub fn build_config(app: &ApplicationIdentity, builder: &BuilderSettings) -> ResourceDefinition {
    let name = build_config_name(app);
    let env: Vec<Value> = builder
        .env
        .iter()
        .map(|(k, v)| json!({ "name": k, "value": v }))
        .collect();
    let manifest = json!({
        "apiVersion": ResourceKind::BuildConfig.api_version(),
        "kind": ResourceKind::BuildConfig.kind(),
        "metadata": {
            "name": name,
            "labels": metadata_labels(app.name()),
        },
        "spec": {
            "output": {
                "to": {
                    "kind": "ImageStreamTag",
                    "name": image_tag(app),
                },
            },
            "strategy": {
                "type": "Source",
                "sourceStrategy": {
                    "from": {
                        "kind": "DockerImage",
                        "name": builder.image,
                    },
                    "incremental": true,
                    "env": env,
                },
            },
            "source": { "type": "Binary" },
        },
    });
    ResourceDefinition::new(ResourceKind::BuildConfig, name, app.name(), manifest)
}

fn http_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::String(ADMIN_PORT_NAME.to_string()),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        timeout_seconds: Some(1),
        period_seconds: Some(10),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

fn container_port(port: i32, name: &str) -> ContainerPort {
    ContainerPort {
        container_port: port,
        name: Some(name.to_string()),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// The application deployment.
pub fn deployment(app: &ApplicationIdentity, env: &EnvironmentMap) -> Result<ResourceDefinition> {
    let name = app.name();
    let container = Container {
        name: name.to_string(),
        image: Some(image_tag(app)),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(vec![
            container_port(HTTP_PORT, HTTP_PORT_NAME),
            container_port(ADMIN_PORT, ADMIN_PORT_NAME),
        ]),
        env: Some(env.to_env_vars()),
        readiness_probe: Some(http_probe(READINESS_PATH)),
        liveness_probe: Some(http_probe(LIVENESS_PATH)),
        termination_message_path: Some("/dev/termination-log".to_string()),
        ..Default::default()
    };

    let deployment = Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(metadata_labels(name)),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(app.replicas()),
            selector: LabelSelector {
                match_labels: Some(selector_labels(name)),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels(name)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    restart_policy: Some("Always".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    ResourceDefinition::from_resource(ResourceKind::Deployment, name, name, &deployment)
}

/// ClusterIP service in front of the application pods.
pub fn service(app: &ApplicationIdentity) -> Result<ResourceDefinition> {
    let name = app.name();
    let service = Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(metadata_labels(name)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            session_affinity: Some("None".to_string()),
            selector: Some(selector_labels(name)),
            ports: Some(vec![ServicePort {
                name: Some(HTTP_PORT_NAME.to_string()),
                protocol: Some("TCP".to_string()),
                port: HTTP_PORT,
                target_port: Some(IntOrString::Int(HTTP_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    ResourceDefinition::from_resource(ResourceKind::Service, name, name, &service)
}

/// Single-replica deployment of a deployer's backing container, named
/// `<app>-<deployer>`.
pub fn backing_deployment(
    app: &ApplicationIdentity,
    name: &str,
    image: &str,
    port: i32,
    env: &EnvironmentMap,
) -> Result<ResourceDefinition> {
    let container = Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(vec![container_port(port, "service")]),
        env: Some(env.to_env_vars()),
        ..Default::default()
    };

    let mut labels = metadata_labels(name);
    labels.insert(PART_OF_LABEL.to_string(), app.name().to_string());

    let deployment = Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels(name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels(name)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    restart_policy: Some("Always".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    ResourceDefinition::from_resource(ResourceKind::Deployment, name, name, &deployment)
}

pub fn backing_service(
    app: &ApplicationIdentity,
    name: &str,
    port: i32,
) -> Result<ResourceDefinition> {
    let mut labels = metadata_labels(name);
    labels.insert(PART_OF_LABEL.to_string(), app.name().to_string());

    let service = Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(name)),
            ports: Some(vec![ServicePort {
                name: Some("service".to_string()),
                protocol: Some("TCP".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    ResourceDefinition::from_resource(ResourceKind::Service, name, name, &service)
}
