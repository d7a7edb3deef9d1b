//! Platform error types

use thiserror::Error;

/// Numeric error codes reported by the platform that the polling loops
/// treat as "not ready yet" rather than as a failure.
pub mod codes {
    /// Buildpack compilation failed during detection
    pub const BUILDPACK_COMPILE_FAILED: u32 = 170004;
    /// Not enough resources to place an instance yet
    pub const INSUFFICIENT_RESOURCES: u32 = 150003;
    /// Instance information is not available yet
    pub const INSTANCES_ERROR: u32 = 220001;
    /// Staging has not finished yet
    pub const STAGING_NOT_FINISHED: u32 = 170002;
    /// Instance statistics are not available yet
    pub const STATS_UNAVAILABLE: u32 = 200003;

    /// Application name already used in the space
    pub const APP_NAME_TAKEN: u32 = 100002;
    /// Route already exists
    pub const ROUTE_TAKEN: u32 = 210003;
    /// Service instance already bound to the application
    pub const BINDING_EXISTS: u32 = 90003;
}

/// Platform errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The platform rejected the request
    #[error("platform error {code}: {description}")]
    Api { code: u32, description: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The request never produced an answer
    #[error("transport error: {0}")]
    Transport(String),
}

impl PlatformError {
    pub fn api(code: u32, description: impl Into<String>) -> Self {
        PlatformError::Api {
            code,
            description: description.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        PlatformError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Platform error code, if the platform answered
    pub fn code(&self) -> Option<u32> {
        match self {
            PlatformError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether an observation loop should keep polling after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code(),
            Some(
                codes::STAGING_NOT_FINISHED
                    | codes::BUILDPACK_COMPILE_FAILED
                    | codes::INSUFFICIENT_RESOURCES
                    | codes::INSTANCES_ERROR
                    | codes::STATS_UNAVAILABLE
            )
        )
    }
}

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_codes() {
        assert!(PlatformError::api(codes::STATS_UNAVAILABLE, "stats").is_transient());
        assert!(PlatformError::api(codes::STAGING_NOT_FINISHED, "staging").is_transient());
        assert!(!PlatformError::api(codes::APP_NAME_TAKEN, "taken").is_transient());
        assert!(!PlatformError::not_found("application", "x").is_transient());
    }

    #[test]
    fn test_display_carries_code() {
        let err = PlatformError::api(10008, "The request is semantically invalid");
        assert_eq!(
            err.to_string(),
            "platform error 10008: The request is semantically invalid"
        );
    }
}
