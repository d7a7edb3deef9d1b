//! Orchestrator configuration and per-call options

use crate::polling::Backoff;
use ferry_types::SpaceId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Defaults for the observation loops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Give up waiting for staging after this many seconds
    pub staging_timeout_secs: u64,
    /// Give up waiting for a running instance after this many seconds
    pub startup_timeout_secs: u64,
    /// Give up waiting for an asynchronous job after this many seconds
    pub job_timeout_secs: u64,
    /// First delay between polls, in milliseconds
    pub poll_initial_delay_ms: u64,
    /// Upper bound for the doubling delay between polls, in milliseconds
    pub poll_max_delay_ms: u64,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            staging_timeout_secs: 15 * 60,
            startup_timeout_secs: 5 * 60,
            job_timeout_secs: 5 * 60,
            poll_initial_delay_ms: 1_000,
            poll_max_delay_ms: 15_000,
        }
    }
}

impl DeploymentConfig {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            staging: Duration::from_secs(self.staging_timeout_secs),
            startup: Duration::from_secs(self.startup_timeout_secs),
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Fresh back-off sequence for one observation loop
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.poll_initial_delay_ms),
            Duration::from_millis(self.poll_max_delay_ms),
        )
    }
}

/// Budgets of the staging and start observation loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub staging: Duration,
    pub startup: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        DeploymentConfig::default().timeouts()
    }
}

/// Options of a single push
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Upload and stage but leave the application stopped
    pub no_start: bool,
    /// Overrides the configured timeouts
    pub timeouts: Option<Timeouts>,
    /// Cancelling stops further polling; issued calls are not undone
    pub cancel: CancellationToken,
}

impl PushOptions {
    pub fn no_start() -> Self {
        Self {
            no_start: true,
            ..Default::default()
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Options of a lifecycle operation that waits for the application
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    pub timeouts: Option<Timeouts>,
    pub cancel: CancellationToken,
}

impl WaitOptions {
    pub fn with_timeouts(timeouts: Timeouts) -> Self {
        Self {
            timeouts: Some(timeouts),
            ..Default::default()
        }
    }
}

/// An application addressed by name within a space
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppRef {
    pub space_id: SpaceId,
    pub name: String,
}

impl AppRef {
    pub fn new(space_id: impl Into<SpaceId>, name: impl Into<String>) -> Self {
        Self {
            space_id: space_id.into(),
            name: name.into(),
        }
    }
}

/// Requested scale change; `None` leaves a dimension as it is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScaleRequest {
    pub instances: Option<u32>,
    /// Memory quota in megabytes
    pub memory: Option<u32>,
    /// Disk quota in megabytes
    pub disk: Option<u32>,
}

impl ScaleRequest {
    pub fn is_empty(&self) -> bool {
        self.instances.is_none() && self.memory.is_none() && self.disk.is_none()
    }

    /// Memory or disk changes only take effect after a restart
    pub fn requires_restart(&self) -> bool {
        self.memory.is_some() || self.disk.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets() {
        let timeouts = DeploymentConfig::default().timeouts();
        assert_eq!(timeouts.staging, Duration::from_secs(900));
        assert_eq!(timeouts.startup, Duration::from_secs(300));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: DeploymentConfig =
            serde_json::from_str(r#"{"startup_timeout_secs": 60}"#).unwrap();
        assert_eq!(config.startup_timeout_secs, 60);
        assert_eq!(config.staging_timeout_secs, 900);
        assert_eq!(config.poll_max_delay_ms, 15_000);
    }

    #[test]
    fn test_scale_restart_rule() {
        let instances_only = ScaleRequest {
            instances: Some(3),
            ..Default::default()
        };
        let memory = ScaleRequest {
            memory: Some(512),
            ..Default::default()
        };
        assert!(!instances_only.requires_restart());
        assert!(memory.requires_restart());
        assert!(ScaleRequest::default().is_empty());
    }
}
