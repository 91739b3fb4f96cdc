//! Error types for invar-kube

use std::path::PathBuf;

use invar_core::CoreError;
use thiserror::Error;

/// Result type for invar-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors raised while deriving containers and manifests
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// A resource value that cannot be turned into a Kubernetes quantity
    #[error("missing quantity for {field}: {value}")]
    MissingQuantity { field: String, value: String },

    /// A container declaration that does not decode
    #[error("invalid container declaration in group '{group}': {message}")]
    InvalidDeclaration { group: String, message: String },

    /// Compose file could not be loaded
    #[error("failed to load compose file {path}: {message}")]
    Compose { path: PathBuf, message: String },

    /// Registry tag lookup failed
    #[error("registry lookup failed for {image}: {message}")]
    Registry { image: String, message: String },

    /// Image versions file could not be read
    #[error("invalid image versions file {path}: {message}")]
    ImageVersions { path: PathBuf, message: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for KubeError {
    fn from(err: serde_yaml::Error) -> Self {
        KubeError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for KubeError {
    fn from(err: serde_json::Error) -> Self {
        KubeError::Serialization(err.to_string())
    }
}
