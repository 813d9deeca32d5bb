//! Deploy orchestrator - provisions an application in dependency order.
//!
//! Validate disabled deployers and deployer preflight checks, connect, create the route, resolve deployers,
//! apply the image stream and build config, build, apply the deployment and
//! service, wait for the rollout, then report the URL. Every failure is
//! terminal and nothing already applied is rolled back.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use launchpad_core::cluster::DEFAULT_ARCHIVE;
use launchpad_core::reconcile::DEFAULT_ROLLOUT_TIMEOUT;
use launchpad_core::resource::{self, BuilderSettings};
use launchpad_core::{
    ApplicationIdentity, BuildRun, Capabilities, Cluster, DeployId, EnvironmentMap, Error,
    Reconciler, Result,
};
use launchpad_deployer::{DeployerMatch, DeployerRegistry, ResolveObserver, ResolveRequest};
use tokio::sync::mpsc;
use tracing::{Instrument, error, info, info_span};
use url::Url;

use crate::build::BuildCoordinator;
use crate::event::DeployEvent;

/// Everything needed to deploy one application.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub app: ApplicationIdentity,
    /// Populated server directory; resource YAML is written here too.
    pub output_dir: PathBuf,
    pub capabilities: Capabilities,
    /// Context for deployers; not set on the application.
    pub env: EnvironmentMap,
    /// Set on the application after deployer contributions.
    pub extra_env: EnvironmentMap,
    pub disabled_deployers: BTreeSet<String>,
    pub builder: BuilderSettings,
    pub rollout_timeout: Duration,
    pub build_timeout: Option<Duration>,
    pub archive_path: PathBuf,
}

impl DeployRequest {
    pub fn new(app: ApplicationIdentity, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            app,
            output_dir: output_dir.into(),
            capabilities: Capabilities::default(),
            env: EnvironmentMap::new(),
            extra_env: EnvironmentMap::new(),
            disabled_deployers: BTreeSet::new(),
            builder: BuilderSettings::default(),
            rollout_timeout: DEFAULT_ROLLOUT_TIMEOUT,
            build_timeout: None,
            archive_path: PathBuf::from(DEFAULT_ARCHIVE),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_env(mut self, env: EnvironmentMap) -> Self {
        self.env = env;
        self
    }

    pub fn with_extra_env(mut self, extra_env: EnvironmentMap) -> Self {
        self.extra_env = extra_env;
        self
    }

    pub fn with_disabled<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled_deployers
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_archive_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.archive_path = path.into();
        self
    }
}

/// Result of a successful deploy.
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub deploy_id: DeployId,
    /// Externally reachable address of the application.
    pub url: String,
    pub host: String,
    /// Environment set on the application container.
    pub env: EnvironmentMap,
    pub build: BuildRun,
    /// Resource definitions written, in apply order.
    pub persisted: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// `https://<host>` plus `/<name>` unless the artifact is served at root.
pub fn endpoint_url(host: &str, app: &ApplicationIdentity) -> Result<String> {
    let base = format!("https://{}", host);
    Url::parse(&base)
        .map_err(|e| Error::Cluster(format!("Invalid route host {}: {}", host, e)))?;
    Ok(format!("{}{}", base, app.route_path()))
}

/// Runs deploys against one cluster with a fixed set of deployers.
#[derive(Clone)]
pub struct DeploymentOrchestrator {
    cluster: Arc<dyn Cluster>,
    registry: Arc<DeployerRegistry>,
}

impl DeploymentOrchestrator {
    pub fn new(cluster: Arc<dyn Cluster>, registry: DeployerRegistry) -> Self {
        Self {
            cluster,
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &DeployerRegistry {
        &self.registry
    }

    /// Execute a deploy, returning a channel of events and a handle to get the final result.
    pub fn execute(
        &self,
        request: DeployRequest,
    ) -> (
        mpsc::Receiver<DeployEvent>,
        tokio::task::JoinHandle<Result<DeployOutcome>>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let orchestrator = self.clone();

        let handle = tokio::spawn(async move { orchestrator.run(request, tx).await });

        (rx, handle)
    }

    /// Run a deploy to completion, sending progress on `tx`.
    pub async fn run(
        &self,
        request: DeployRequest,
        tx: mpsc::Sender<DeployEvent>,
    ) -> Result<DeployOutcome> {
        let deploy_id = DeployId::new();
        let span = info_span!("deploy", deploy_id = %deploy_id, app = %request.app.name());

        let result = self
            .run_inner(deploy_id, request, &tx)
            .instrument(span.clone())
            .await;
        if let Err(e) = &result {
            span.in_scope(|| error!(error = %e, "Deploy failed"));
        }
        result
    }

    async fn run_inner(
        &self,
        deploy_id: DeployId,
        request: DeployRequest,
        tx: &mpsc::Sender<DeployEvent>,
    ) -> Result<DeployOutcome> {
        let started_at = Utc::now();
        let app = &request.app;

        // ValidateDeployers
        let disabled = self
            .registry
            .validate_disabled(&request.disabled_deployers)?;
        self.registry
            .preflight(app, &request.capabilities, &disabled)?;

        // Connect
        let version = self.cluster.server_version().await?;
        info!(cluster = %self.cluster.name(), version = %version, "Connected");
        let _ = tx
            .send(DeployEvent::Connected {
                cluster: self.cluster.name().to_string(),
                version,
            })
            .await;

        let reconciler = Reconciler::new(self.cluster.clone(), &request.output_dir);

        // CreateRoute
        reconciler.apply(&resource::route(app)).await?;
        let host = reconciler.route_host(app.name()).await?;
        let url = endpoint_url(&host, app)?;
        info!(host = %host, "Route created");
        let _ = tx
            .send(DeployEvent::RouteCreated { host: host.clone() })
            .await;

        // ResolveDeployers
        let resolution = self
            .registry
            .resolve(ResolveRequest {
                reconciler: &reconciler,
                app,
                host: &host,
                capabilities: &request.capabilities,
                disabled: &disabled,
                env: &request.env,
                extra_env: &request.extra_env,
                observer: &EventObserver(tx),
            })
            .await?;
        let _ = tx
            .send(DeployEvent::EnvironmentSet {
                env: resolution.env.clone(),
                needs_review: resolution.needs_review(),
            })
            .await;

        // ApplyImageStreamAndBuildConfig
        reconciler.apply(&resource::image_stream(app)).await?;
        let build_config = resource::build_config(app, &request.builder);
        reconciler.apply(&build_config).await?;

        // SubmitAndAwaitBuild
        let build = BuildCoordinator::new(self.cluster.clone())
            .with_timeout(request.build_timeout)
            .run(
                build_config.name(),
                &request.output_dir,
                &request.archive_path,
                tx,
            )
            .await?;

        // ApplyDeploymentAndService
        reconciler
            .apply(&resource::deployment(app, &resolution.env)?)
            .await?;
        reconciler.apply(&resource::service(app)?).await?;
        let persisted = reconciler.persisted()?;
        let _ = tx
            .send(DeployEvent::ResourcesPersisted {
                files: persisted.clone(),
            })
            .await;

        // AwaitRollout
        let _ = tx
            .send(DeployEvent::AwaitingRollout {
                deployment: app.name().to_string(),
            })
            .await;
        reconciler
            .await_rollout(app.name(), request.rollout_timeout)
            .await?;

        // ReportEndpoint
        info!(url = %url, "Application deployed");
        let _ = tx.send(DeployEvent::Completed { url: url.clone() }).await;

        Ok(DeployOutcome {
            deploy_id,
            url,
            host,
            env: resolution.env,
            build,
            persisted,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Reports each deployer to the event channel before it runs.
struct EventObserver<'a>(&'a mpsc::Sender<DeployEvent>);

#[async_trait]
impl<'a> ResolveObserver for EventObserver<'a> {
    async fn engaging(&self, matched: &DeployerMatch) {
        let event = if matched.disabled {
            DeployEvent::DeployerDisabled {
                deployer: matched.deployer.clone(),
                capability: matched.capability.clone(),
            }
        } else {
            DeployEvent::DeployerEngaged {
                deployer: matched.deployer.clone(),
                capability: matched.capability.clone(),
            }
        };
        let _ = self.0.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use futures::stream;
    use launchpad_core::{
        BuildPhase, BuildUpdate, BuildWatch, Capability, DeployContext, Deployer,
        DeployerDescriptor, ResourceDefinition, ResourceKind,
    };
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOST: &str = "app-demo.apps.example.com";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Apply(ResourceKind, String),
        Instantiate(String),
        Watch(String),
        WaitReady(String),
    }

    /// Records every call and replays a scripted build.
    struct FakeCluster {
        phases: Vec<BuildPhase>,
        rollout_times_out: bool,
        calls: Mutex<Vec<Call>>,
        manifests: Mutex<Vec<ResourceDefinition>>,
        connects: AtomicUsize,
    }

    impl FakeCluster {
        fn new(phases: Vec<BuildPhase>) -> Arc<Self> {
            Self::build(phases, false)
        }

        /// Builds succeed but the deployment never becomes ready.
        fn stalled_rollout(phases: Vec<BuildPhase>) -> Arc<Self> {
            Self::build(phases, true)
        }

        fn build(phases: Vec<BuildPhase>, rollout_times_out: bool) -> Arc<Self> {
            Arc::new(Self {
                phases,
                rollout_times_out,
                calls: Mutex::new(Vec::new()),
                manifests: Mutex::new(Vec::new()),
                connects: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn applied(&self, kind: ResourceKind) -> Option<ResourceDefinition> {
            self.manifests
                .lock()
                .unwrap()
                .iter()
                .find(|d| d.kind() == kind)
                .cloned()
        }
    }

    #[async_trait]
    impl Cluster for FakeCluster {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn server_version(&self) -> Result<String> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok("v1.30.0".to_string())
        }

        async fn apply(&self, resource: &ResourceDefinition) -> Result<Value> {
            self.calls.lock().unwrap().push(Call::Apply(
                resource.kind(),
                resource.name().to_string(),
            ));
            self.manifests.lock().unwrap().push(resource.clone());
            Ok(resource.manifest().clone())
        }

        async fn get(&self, kind: ResourceKind, name: &str) -> Result<Option<Value>> {
            assert_eq!(kind, ResourceKind::Route);
            Ok(Some(json!({
                "metadata": { "name": name },
                "spec": { "host": HOST },
            })))
        }

        async fn instantiate_binary(&self, build_config: &str, archive: Bytes) -> Result<BuildRun> {
            assert!(!archive.is_empty());
            self.calls
                .lock()
                .unwrap()
                .push(Call::Instantiate(build_config.to_string()));
            Ok(BuildRun {
                name: format!("{}-1", build_config),
                build_config: build_config.to_string(),
            })
        }

        async fn watch_build(&self, run: &BuildRun) -> Result<BuildWatch> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Watch(run.name.clone()));
            let updates: Vec<Result<BuildUpdate>> = self
                .phases
                .iter()
                .cloned()
                .map(|p| Ok(BuildUpdate::new(p)))
                .collect();
            Ok(BuildWatch::new(&run.name, stream::iter(updates).boxed()))
        }

        async fn wait_until_ready(
            &self,
            _kind: ResourceKind,
            name: &str,
            timeout: Duration,
        ) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::WaitReady(name.to_string()));
            if self.rollout_times_out {
                return Err(Error::Timeout(format!(
                    "deployment {} not ready within {}s",
                    name,
                    timeout.as_secs()
                )));
            }
            Ok(())
        }
    }

    struct DbDeployer {
        descriptor: DeployerDescriptor,
    }

    impl DbDeployer {
        fn new() -> Arc<dyn Deployer> {
            Arc::new(Self {
                descriptor: DeployerDescriptor::new("db").with_layers(["postgresql-datasource"]),
            })
        }
    }

    #[async_trait]
    impl Deployer for DbDeployer {
        fn descriptor(&self) -> &DeployerDescriptor {
            &self.descriptor
        }

        async fn deploy(&self, ctx: DeployContext<'_>) -> Result<EnvironmentMap> {
            Ok(EnvironmentMap::new().with(
                "DB_URL",
                format!("postgresql://{}-db:5432/{}", ctx.app.name(), ctx.app.name()),
            ))
        }

        fn inert_deploy(
            &self,
            _host: &str,
            app_name: &str,
            _capability: &Capability,
            _env: &EnvironmentMap,
        ) -> EnvironmentMap {
            EnvironmentMap::new().with("DB_URL", format!("postgresql://{}-db:5432", app_name))
        }
    }

    /// Applies a backing service named `<app>-<name>`; its deploy always fails.
    struct BackedDeployer {
        descriptor: DeployerDescriptor,
    }

    impl BackedDeployer {
        fn new(name: &str) -> Arc<dyn Deployer> {
            Arc::new(Self {
                descriptor: DeployerDescriptor::new(name).with_layers(["elytron-oidc-client"]),
            })
        }
    }

    #[async_trait]
    impl Deployer for BackedDeployer {
        fn descriptor(&self) -> &DeployerDescriptor {
            &self.descriptor
        }

        fn preflight(&self, app: &ApplicationIdentity) -> Result<()> {
            launchpad_core::app::validate_resource_name(&format!(
                "{}-{}",
                app.name(),
                self.name()
            ))
        }

        async fn deploy(&self, _ctx: DeployContext<'_>) -> Result<EnvironmentMap> {
            Err(Error::Cluster("backing image pull failed".to_string()))
        }

        fn inert_deploy(
            &self,
            _host: &str,
            _app_name: &str,
            _capability: &Capability,
            _env: &EnvironmentMap,
        ) -> EnvironmentMap {
            EnvironmentMap::new()
        }
    }

    struct Workspace {
        _dir: tempfile::TempDir,
        output_dir: PathBuf,
        archive_path: PathBuf,
    }

    fn workspace() -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("server");
        std::fs::create_dir_all(output_dir.join("deployments")).unwrap();
        std::fs::write(output_dir.join("deployments/app.war"), "war").unwrap();
        let archive_path = dir.path().join("app.tar.gz");
        Workspace {
            _dir: dir,
            output_dir,
            archive_path,
        }
    }

    fn request(ws: &Workspace, app: ApplicationIdentity) -> DeployRequest {
        DeployRequest::new(app, &ws.output_dir).with_archive_path(&ws.archive_path)
    }

    fn registry(deployers: Vec<Arc<dyn Deployer>>) -> DeployerRegistry {
        DeployerRegistry::new(deployers).unwrap()
    }

    fn complete() -> Vec<BuildPhase> {
        vec![BuildPhase::Pending, BuildPhase::Running, BuildPhase::Complete]
    }

    async fn collect(mut rx: mpsc::Receiver<DeployEvent>) -> Vec<DeployEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_root_war_without_capabilities() {
        let ws = workspace();
        let cluster = FakeCluster::new(complete());
        let orchestrator = DeploymentOrchestrator::new(cluster.clone(), DeployerRegistry::empty());
        let app = ApplicationIdentity::from_artifact("ROOT.war", false).unwrap();

        let (rx, handle) = orchestrator.execute(request(&ws, app));
        let events = collect(rx).await;
        let outcome = handle.await.unwrap().unwrap();

        assert_eq!(outcome.url, format!("https://{}", HOST));
        assert_eq!(outcome.host, HOST);
        assert!(outcome.env.is_empty());
        assert_eq!(outcome.build.name, "root-build-1");
        assert!(events.contains(&DeployEvent::Completed {
            url: format!("https://{}", HOST)
        }));

        let deployment = cluster.applied(ResourceKind::Deployment).unwrap();
        assert_eq!(deployment.manifest()["spec"]["replicas"], 1);

        // The archive guard removes the build archive
        assert!(!ws.archive_path.exists());
    }

    #[tokio::test]
    async fn test_ha_app_with_deployer() {
        let ws = workspace();
        let cluster = FakeCluster::new(complete());
        let orchestrator =
            DeploymentOrchestrator::new(cluster.clone(), registry(vec![DbDeployer::new()]));
        let app = ApplicationIdentity::new("myapp", "myapp.war", true).unwrap();
        let request = request(&ws, app)
            .with_capabilities(Capabilities::new().with_layer("postgresql-datasource"));

        let (rx, handle) = orchestrator.execute(request);
        let events = collect(rx).await;
        let outcome = handle.await.unwrap().unwrap();

        assert_eq!(outcome.url, format!("https://{}/myapp", HOST));
        assert_eq!(
            outcome.env.get("DB_URL"),
            Some("postgresql://myapp-db:5432/myapp")
        );

        let deployment = cluster.applied(ResourceKind::Deployment).unwrap();
        assert_eq!(deployment.manifest()["spec"]["replicas"], 2);
        let env = &deployment.manifest()["spec"]["template"]["spec"]["containers"][0]["env"];
        assert_eq!(env[0]["name"], "DB_URL");

        assert!(events.iter().any(|e| matches!(
            e,
            DeployEvent::DeployerEngaged { deployer, .. } if deployer == "db"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            DeployEvent::EnvironmentSet { needs_review: false, .. }
        )));
    }

    #[tokio::test]
    async fn test_resources_applied_in_order() {
        let ws = workspace();
        let cluster = FakeCluster::new(complete());
        let orchestrator = DeploymentOrchestrator::new(cluster.clone(), DeployerRegistry::empty());
        let app = ApplicationIdentity::new("shop", "shop.war", false).unwrap();

        let (tx, _rx) = mpsc::channel(100);
        let outcome = orchestrator.run(request(&ws, app), tx).await.unwrap();

        assert_eq!(
            cluster.calls(),
            vec![
                Call::Apply(ResourceKind::Route, "shop".to_string()),
                Call::Apply(ResourceKind::ImageStream, "shop".to_string()),
                Call::Apply(ResourceKind::BuildConfig, "shop-build".to_string()),
                Call::Instantiate("shop-build".to_string()),
                Call::Watch("shop-build-1".to_string()),
                Call::Apply(ResourceKind::Deployment, "shop".to_string()),
                Call::Apply(ResourceKind::Service, "shop".to_string()),
                Call::WaitReady("shop".to_string()),
            ]
        );

        let files: Vec<String> = outcome
            .persisted
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            files,
            vec![
                "shop-route.yaml",
                "shop-image-stream.yaml",
                "shop-build-config.yaml",
                "shop-deployment.yaml",
                "shop-service.yaml",
            ]
        );
        assert!(ws.output_dir.join("shop-route.yaml").exists());
    }

    #[tokio::test]
    async fn test_build_completion_unblocks_once() {
        let ws = workspace();
        let cluster = FakeCluster::new(vec![BuildPhase::Running, BuildPhase::Complete]);
        let orchestrator = DeploymentOrchestrator::new(cluster.clone(), DeployerRegistry::empty());
        let app = ApplicationIdentity::new("shop", "shop.war", false).unwrap();

        let (rx, handle) = orchestrator.execute(request(&ws, app));
        let events = collect(rx).await;
        handle.await.unwrap().unwrap();

        let completed = events
            .iter()
            .filter(|e| matches!(e, DeployEvent::BuildCompleted { .. }))
            .count();
        assert_eq!(completed, 1);

        let build_done = events
            .iter()
            .position(|e| matches!(e, DeployEvent::BuildCompleted { .. }))
            .unwrap();
        let rollout = events
            .iter()
            .position(|e| matches!(e, DeployEvent::AwaitingRollout { .. }))
            .unwrap();
        assert!(build_done < rollout);
        assert!(cluster.applied(ResourceKind::Deployment).is_some());
    }

    #[tokio::test]
    async fn test_failed_build_skips_deployment() {
        let ws = workspace();
        let cluster = FakeCluster::new(vec![BuildPhase::Running, BuildPhase::Failed]);
        let orchestrator = DeploymentOrchestrator::new(cluster.clone(), DeployerRegistry::empty());
        let app = ApplicationIdentity::new("shop", "shop.war", false).unwrap();

        let (tx, _rx) = mpsc::channel(100);
        let err = orchestrator.run(request(&ws, app), tx).await.unwrap_err();

        assert!(matches!(err, Error::BuildFailed { ref phase, .. } if phase == "Failed"));
        assert!(cluster.applied(ResourceKind::Deployment).is_none());
        assert!(cluster.applied(ResourceKind::Service).is_none());
        assert!(!cluster.calls().iter().any(|c| matches!(c, Call::WaitReady(_))));
        assert!(!ws.archive_path.exists());
    }

    #[tokio::test]
    async fn test_unknown_disabled_deployer_fails_before_cluster_calls() {
        let ws = workspace();
        let cluster = FakeCluster::new(complete());
        let orchestrator =
            DeploymentOrchestrator::new(cluster.clone(), registry(vec![DbDeployer::new()]));
        let app = ApplicationIdentity::new("shop", "shop.war", false).unwrap();

        let (tx, _rx) = mpsc::channel(100);
        let err = orchestrator
            .run(request(&ws, app).with_disabled(["mongo"]), tx)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert_eq!(cluster.connects.load(Ordering::SeqCst), 0);
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disable_all_reports_review() {
        let ws = workspace();
        let cluster = FakeCluster::new(complete());
        let orchestrator =
            DeploymentOrchestrator::new(cluster.clone(), registry(vec![DbDeployer::new()]));
        let app = ApplicationIdentity::new("shop", "shop.war", false).unwrap();
        let request = request(&ws, app)
            .with_capabilities(Capabilities::new().with_layer("postgresql-datasource"))
            .with_disabled(["ALL"])
            .with_extra_env(EnvironmentMap::new().with("DB_URL", "postgresql://external/shop"));

        let (rx, handle) = orchestrator.execute(request);
        let events = collect(rx).await;
        let outcome = handle.await.unwrap().unwrap();

        assert_eq!(outcome.env.get("DB_URL"), Some("postgresql://external/shop"));
        assert!(events.iter().any(|e| matches!(
            e,
            DeployEvent::DeployerDisabled { deployer, .. } if deployer == "db"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            DeployEvent::EnvironmentSet { needs_review: true, .. }
        )));
    }

    #[tokio::test]
    async fn test_invalid_backing_name_fails_before_cluster_calls() {
        let ws = workspace();
        let cluster = FakeCluster::new(complete());
        let orchestrator = DeploymentOrchestrator::new(
            cluster.clone(),
            registry(vec![BackedDeployer::new("Bad_DB")]),
        );
        let app = ApplicationIdentity::new("shop", "shop.war", false).unwrap();
        let request = request(&ws, app)
            .with_capabilities(Capabilities::new().with_layer("elytron-oidc-client"));

        let (tx, _rx) = mpsc::channel(100);
        let err = orchestrator.run(request, tx).await.unwrap_err();

        assert!(matches!(err, Error::Config(msg) if msg.contains("shop-Bad_DB")));
        assert_eq!(cluster.connects.load(Ordering::SeqCst), 0);
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn test_engaged_notice_precedes_later_deployer_failure() {
        let ws = workspace();
        let cluster = FakeCluster::new(complete());
        let orchestrator = DeploymentOrchestrator::new(
            cluster.clone(),
            registry(vec![DbDeployer::new(), BackedDeployer::new("sso")]),
        );
        let app = ApplicationIdentity::new("shop", "shop.war", false).unwrap();
        let request = request(&ws, app).with_capabilities(
            Capabilities::new()
                .with_layer("postgresql-datasource")
                .with_layer("elytron-oidc-client"),
        );

        let (rx, handle) = orchestrator.execute(request);
        let events = collect(rx).await;
        let err = handle.await.unwrap().unwrap_err();

        assert!(matches!(err, Error::Cluster(_)));
        let engaged: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                DeployEvent::DeployerEngaged { deployer, .. } => Some(deployer.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(engaged, vec!["db", "sso"]);
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, DeployEvent::EnvironmentSet { .. }))
        );
    }

    #[tokio::test]
    async fn test_rollout_timeout_reaches_caller() {
        let ws = workspace();
        let cluster = FakeCluster::stalled_rollout(complete());
        let orchestrator = DeploymentOrchestrator::new(cluster.clone(), DeployerRegistry::empty());
        let app = ApplicationIdentity::new("shop", "shop.war", false).unwrap();
        let mut request = request(&ws, app);
        request.rollout_timeout = Duration::from_secs(42);

        let (rx, handle) = orchestrator.execute(request);
        let events = collect(rx).await;
        let err = handle.await.unwrap().unwrap_err();

        assert!(matches!(err, Error::Timeout(msg) if msg.contains("42s")));
        assert!(cluster.applied(ResourceKind::Deployment).is_some());
        assert!(
            events
                .iter()
                .any(|e| matches!(e, DeployEvent::AwaitingRollout { .. }))
        );
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, DeployEvent::Completed { .. }))
        );
    }

    #[test]
    fn test_endpoint_url() {
        let root = ApplicationIdentity::from_artifact("ROOT.war", false).unwrap();
        let shop = ApplicationIdentity::new("shop", "shop.war", false).unwrap();
        assert_eq!(
            endpoint_url("a.example.com", &root).unwrap(),
            "https://a.example.com"
        );
        assert_eq!(
            endpoint_url("a.example.com", &shop).unwrap(),
            "https://a.example.com/shop"
        );
        assert!(endpoint_url("bad host", &shop).is_err());
    }
}
