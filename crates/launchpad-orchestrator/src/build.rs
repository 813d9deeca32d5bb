//! Binary build submission and the blocking wait on its phases.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use launchpad_core::{BuildPhase, BuildRun, BuildWatch, Cluster, Error, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::archive::create_archive;
use crate::event::DeployEvent;

/// Submits the output directory as a binary build and waits for it.
pub struct BuildCoordinator {
    cluster: Arc<dyn Cluster>,
    timeout: Option<Duration>,
}

impl BuildCoordinator {
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self {
            cluster,
            timeout: None,
        }
    }

    /// Bound the wait for a terminal phase.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Archive `source_dir` to `archive_path`, start a build of
    /// `build_config` from it and block until the build completes.
    ///
    /// The archive is removed when this returns or is cancelled.
    pub async fn run(
        &self,
        build_config: &str,
        source_dir: &Path,
        archive_path: &Path,
        tx: &mpsc::Sender<DeployEvent>,
    ) -> Result<BuildRun> {
        let archive = create_archive(source_dir, archive_path).await?;
        debug!(
            path = %archive.path().display(),
            bytes = archive.len(),
            "Archived output directory"
        );

        let run = self
            .cluster
            .instantiate_binary(build_config, archive.bytes())
            .await?;
        info!(build = %run.name, build_config = %build_config, "Build started");
        let _ = tx
            .send(DeployEvent::BuildStarted {
                build: run.name.clone(),
            })
            .await;

        let mut watch = self.cluster.watch_build(&run).await?;
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, await_build(&mut watch, tx))
                .await
                .map_err(|_| {
                    Error::Timeout(format!(
                        "Build {} did not finish within {:?}",
                        run.name, timeout
                    ))
                })??,
            None => await_build(&mut watch, tx).await?,
        }

        info!(build = %run.name, "Build complete");
        let _ = tx
            .send(DeployEvent::BuildCompleted {
                build: run.name.clone(),
            })
            .await;

        Ok(run)
    }
}

/// Consume phase updates until the first terminal phase.
///
/// `Complete` returns `Ok`; any other terminal phase is `BuildFailed`. A
/// watch that errors or ends first fails rather than waiting forever.
pub async fn await_build(watch: &mut BuildWatch, tx: &mpsc::Sender<DeployEvent>) -> Result<()> {
    let mut last: Option<BuildPhase> = None;

    while let Some(update) = watch.next().await {
        let update = update?;

        if last.as_ref() != Some(&update.phase) {
            debug!(build = %watch.build(), phase = %update.phase, "Build phase changed");
            let _ = tx
                .send(DeployEvent::BuildPhase {
                    build: watch.build().to_string(),
                    phase: update.phase.clone(),
                })
                .await;
            last = Some(update.phase.clone());
        }

        if update.phase.is_success() {
            return Ok(());
        }
        if update.phase.is_terminal() {
            return Err(Error::BuildFailed {
                build: watch.build().to_string(),
                phase: update.phase.to_string(),
                message: update
                    .message
                    .unwrap_or_else(|| "no status message".to_string()),
            });
        }
    }

    Err(Error::Cluster(format!(
        "Watch on build {} ended before the build finished",
        watch.build()
    )))
}
