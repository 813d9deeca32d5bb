//! Error types for Launchpad.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before any cluster call is made.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cluster error: {0}")]
    Cluster(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("build {build} ended in phase {phase}: {message}")]
    BuildFailed {
        build: String,
        phase: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
