//! Manifest error types

use std::path::PathBuf;
use thiserror::Error;

/// Manifest resolution errors
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write manifest: {0}")]
    Write(#[from] std::io::Error),

    #[error("failed to render manifest: {0}")]
    Render(#[from] serde_yaml::Error),

    #[error("expected to find variable '{variable}' in {location}")]
    UnresolvedVariable { variable: String, location: String },

    #[error("invalid manifest ({context}): {reason}")]
    InvalidManifest { context: String, reason: String },

    #[error("{location} does not contain required '{field}' value")]
    MissingRequiredField {
        field: &'static str,
        location: String,
    },
}

impl ManifestError {
    pub fn invalid(context: impl Into<String>, reason: impl ToString) -> Self {
        ManifestError::InvalidManifest {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;
