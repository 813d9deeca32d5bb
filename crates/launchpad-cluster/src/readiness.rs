//! Status interpretation for watched objects.

use k8s_openapi::api::apps::v1::Deployment;
use launchpad_core::{BuildPhase, BuildUpdate};
use serde_json::Value;

/// True once the controller has observed the latest spec and every desired
/// replica is updated, ready and available.
pub fn is_deployment_rolled_out(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let Some(status) = deployment.status.as_ref() else {
        return false;
    };

    let generation = deployment.metadata.generation.unwrap_or(0);
    let observed = status.observed_generation.unwrap_or(0);
    if observed < generation {
        return false;
    }

    status.updated_replicas.unwrap_or(0) == desired
        && status.ready_replicas.unwrap_or(0) == desired
        && status.available_replicas.unwrap_or(0) == desired
}

/// Phase and message from a build object's `status`. A build without a
/// phase yet is `New`.
pub fn build_update(build: &Value) -> BuildUpdate {
    let status = &build["status"];
    let phase = status["phase"]
        .as_str()
        .map(BuildPhase::parse)
        .unwrap_or(BuildPhase::New);
    let update = BuildUpdate::new(phase);
    match status["message"].as_str().filter(|m| !m.is_empty()) {
        Some(message) => update.with_message(message),
        None => update,
    }
}
