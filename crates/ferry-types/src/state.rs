//! Remote lifecycle state enumerations
//!
//! These are the values the orchestrator branches on while observing the
//! platform. Anything the platform reports that is not recognised maps to an
//! `Unknown` variant instead of failing deserialization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested state of an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    Started,
    Stopped,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppState::Started => f.write_str("STARTED"),
            AppState::Stopped => f.write_str("STOPPED"),
        }
    }
}

/// Staging state of an application's current package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageState {
    Pending,
    Staged,
    Failed,
}

impl PackageState {
    /// Staging has reached a definitive answer
    pub fn is_terminal(&self) -> bool {
        matches!(self, PackageState::Staged | PackageState::Failed)
    }
}

/// State of a single running instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Starting,
    Running,
    Crashed,
    Flapping,
    Down,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Starting => "STARTING",
            InstanceState::Running => "RUNNING",
            InstanceState::Crashed => "CRASHED",
            InstanceState::Flapping => "FLAPPING",
            InstanceState::Down => "DOWN",
            InstanceState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Aggregate of all instance states of one application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    /// At least one instance is running
    Running,
    /// Some instance crashed or is flapping and none is running
    Failed,
    /// No definitive answer yet
    Pending,
}

impl RunState {
    /// Fold instance states, with any running instance taking precedence
    /// over crashed or flapping ones.
    pub fn aggregate<I>(states: I) -> Self
    where
        I: IntoIterator<Item = InstanceState>,
    {
        states.into_iter().fold(RunState::Pending, |total, state| {
            match (total, state) {
                (RunState::Running, _) | (_, InstanceState::Running) => RunState::Running,
                (_, InstanceState::Crashed) | (_, InstanceState::Flapping) => RunState::Failed,
                (total, _) => total,
            }
        })
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Pending)
    }
}

/// State of a staging build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildState {
    Staging,
    Staged,
    Failed,
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Staged | BuildState::Failed)
    }
}

/// State of an uploaded package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageUploadState {
    AwaitingUpload,
    ProcessingUpload,
    Ready,
    Failed,
}

/// State of an asynchronous platform job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Processing,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }
}

/// Stage of a single application's push pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PushStage {
    Resolving,
    RoutesPrepared,
    ServicesBound,
    ArtifactUploaded,
    Staging,
    Staged,
    StagingFailed,
    StagingTimedOut,
    Starting,
    Running,
    RunFailed,
    RunTimedOut,
}

impl PushStage {
    /// The pipeline ends in this stage
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PushStage::Running
                | PushStage::StagingFailed
                | PushStage::StagingTimedOut
                | PushStage::RunFailed
                | PushStage::RunTimedOut
        )
    }
}

impl fmt::Display for PushStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
