//! Cluster backends for Launchpad.
//!
//! `KubeCluster` talks to a Kubernetes API server with the OpenShift route,
//! image and build APIs installed. The client comes from the local kubeconfig
//! or the in-cluster service account.

pub mod kubernetes;
pub mod readiness;

pub use kubernetes::KubeCluster;
pub use launchpad_core::cluster::{BuildPhase, BuildRun, BuildUpdate, BuildWatch, Cluster};
