//! CLI error types

use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manifest could not be resolved or written
    #[error("Manifest error: {0}")]
    Manifest(#[from] ferry_manifest::ManifestError),

    /// Route could not be decomposed
    #[error("Route error: {0}")]
    Route(#[from] ferry_routing::RouteError),

    /// A deployment operation failed
    #[error("Deployment error: {0}")]
    Deployment(#[from] ferry_deployment::DeploymentError),

    /// Some applications of a multi-application push failed
    #[error("{failed} of {total} applications failed to push")]
    PushFailed {
        /// Number of failed applications
        failed: usize,
        /// Number of applications pushed
        total: usize,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encoding error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML encoding error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
