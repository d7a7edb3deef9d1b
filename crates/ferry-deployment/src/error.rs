//! Deployment error types

use crate::artifact::ArtifactError;
use ferry_manifest::ManifestError;
use ferry_platform::PlatformError;
use ferry_routing::RouteError;
use ferry_types::{JobId, PushStage};
use std::fmt;
use thiserror::Error;

/// Observation loop that gave up waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    Staging,
    Start,
    Job,
}

impl fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPhase::Staging => f.write_str("staging"),
            WaitPhase::Start => f.write_str("start"),
            WaitPhase::Job => f.write_str("job completion"),
        }
    }
}

/// Deployment errors
///
/// `StagingFailed`/`RunFailed` mean the platform gave a negative answer;
/// `TimedOut` means no answer arrived in time.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("Application {app} has an invalid manifest: {reason}")]
    InvalidManifest { app: String, reason: String },

    #[error("Application {app}: expected to find variable '{variable}'")]
    UnresolvedVariable { app: String, variable: String },

    #[error("Application {app}: the route {route} did not match any existing domains")]
    DomainNotFound { app: String, route: String },

    #[error("Application {app}: the route {route} is invalid: {reason}")]
    InvalidRoute {
        app: String,
        route: String,
        reason: String,
    },

    #[error("Application {app}: no shared domain is available for a default route")]
    NoDefaultDomain { app: String },

    /// The platform rejected a call; the platform error is kept verbatim
    #[error("Application {app}: {source}")]
    RemoteOperationFailed {
        app: String,
        #[source]
        source: PlatformError,
    },

    #[error("Application {app} failed during staging: {reason}")]
    StagingFailed { app: String, reason: String },

    #[error("Application {app} failed during start: {reason}")]
    RunFailed { app: String, reason: String },

    #[error("Application {app} timed out during {phase}")]
    TimedOut { app: String, phase: WaitPhase },

    #[error("Application {app} does not exist")]
    ApplicationNotFound { app: String },

    #[error("Application {app}: {kind} {name} does not exist")]
    NotFound {
        app: String,
        kind: &'static str,
        name: String,
    },

    #[error("Application {app}: job {job} failed: {}", errors.join("; "))]
    JobFailed {
        app: String,
        job: JobId,
        errors: Vec<String>,
    },

    #[error("Application {app}: push cancelled during {stage}")]
    Cancelled { app: String, stage: PushStage },

    #[error("Application {app}: cannot read artifact: {source}")]
    Artifact {
        app: String,
        #[source]
        source: ArtifactError,
    },
}

impl DeploymentError {
    pub fn remote(app: impl Into<String>, source: PlatformError) -> Self {
        DeploymentError::RemoteOperationFailed {
            app: app.into(),
            source,
        }
    }

    pub fn invalid_manifest(app: impl Into<String>, reason: impl ToString) -> Self {
        DeploymentError::InvalidManifest {
            app: app.into(),
            reason: reason.to_string(),
        }
    }

    /// Attach the application name to a route resolution error
    pub fn from_route(app: impl Into<String>, error: RouteError) -> Self {
        let app = app.into();
        match error {
            RouteError::DomainNotFound { route } => DeploymentError::DomainNotFound { app, route },
            RouteError::InvalidRoute { route, reason } => {
                DeploymentError::InvalidRoute { app, route, reason }
            }
            RouteError::NoDefaultDomain => DeploymentError::NoDefaultDomain { app },
            RouteError::Platform(source) => DeploymentError::RemoteOperationFailed { app, source },
        }
    }

    /// Attach the application name to a manifest error
    pub fn from_manifest(app: impl Into<String>, error: ManifestError) -> Self {
        let app = app.into();
        match error {
            ManifestError::UnresolvedVariable { variable, .. } => {
                DeploymentError::UnresolvedVariable { app, variable }
            }
            other => DeploymentError::InvalidManifest {
                app,
                reason: other.to_string(),
            },
        }
    }

    /// Application the error concerns
    pub fn app(&self) -> &str {
        match self {
            DeploymentError::InvalidManifest { app, .. }
            | DeploymentError::UnresolvedVariable { app, .. }
            | DeploymentError::DomainNotFound { app, .. }
            | DeploymentError::InvalidRoute { app, .. }
            | DeploymentError::NoDefaultDomain { app }
            | DeploymentError::RemoteOperationFailed { app, .. }
            | DeploymentError::StagingFailed { app, .. }
            | DeploymentError::RunFailed { app, .. }
            | DeploymentError::TimedOut { app, .. }
            | DeploymentError::ApplicationNotFound { app }
            | DeploymentError::NotFound { app, .. }
            | DeploymentError::JobFailed { app, .. }
            | DeploymentError::Cancelled { app, .. }
            | DeploymentError::Artifact { app, .. } => app,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DeploymentError::TimedOut { .. })
    }

    /// Terminal pipeline stage this error corresponds to, if any
    pub fn terminal_stage(&self) -> Option<PushStage> {
        match self {
            DeploymentError::StagingFailed { .. } => Some(PushStage::StagingFailed),
            DeploymentError::RunFailed { .. } => Some(PushStage::RunFailed),
            DeploymentError::TimedOut {
                phase: WaitPhase::Staging,
                ..
            } => Some(PushStage::StagingTimedOut),
            DeploymentError::TimedOut {
                phase: WaitPhase::Start,
                ..
            } => Some(PushStage::RunTimedOut),
            _ => None,
        }
    }
}

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeploymentError>;

/// Attach the application name to errors from the lower crates
pub(crate) trait AppContext<T> {
    fn app_context(self, app: &str) -> Result<T>;
}

impl<T> AppContext<T> for std::result::Result<T, PlatformError> {
    fn app_context(self, app: &str) -> Result<T> {
        self.map_err(|e| DeploymentError::remote(app, e))
    }
}

impl<T> AppContext<T> for std::result::Result<T, RouteError> {
    fn app_context(self, app: &str) -> Result<T> {
        self.map_err(|e| DeploymentError::from_route(app, e))
    }
}

impl<T> AppContext<T> for std::result::Result<T, ManifestError> {
    fn app_context(self, app: &str) -> Result<T> {
        self.map_err(|e| DeploymentError::from_manifest(app, e))
    }
}
