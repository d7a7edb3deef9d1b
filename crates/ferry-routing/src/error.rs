//! Route resolution errors

use ferry_platform::PlatformError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("the route {route} did not match any existing domains")]
    DomainNotFound { route: String },

    #[error("the route {route} is invalid: {reason}")]
    InvalidRoute { route: String, reason: String },

    /// No route was requested and there is no shared domain to fall back on
    #[error("no shared domain is available for a default route")]
    NoDefaultDomain,

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl RouteError {
    pub fn invalid(route: impl Into<String>, reason: impl Into<String>) -> Self {
        RouteError::InvalidRoute {
            route: route.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for route resolution
pub type Result<T> = std::result::Result<T, RouteError>;
