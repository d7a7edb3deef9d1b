//! Push progress events
//!
//! The orchestrator publishes one envelope per stage transition so callers
//! can follow a push without parsing logs.

use crate::ids::AppId;
use crate::state::{InstanceState, PushStage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all push events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Application the event concerns
    pub application: String,

    /// Event severity
    pub severity: EventSeverity,

    /// The actual event
    pub event: PushEvent,
}

impl PushEventEnvelope {
    pub fn new(application: impl Into<String>, event: PushEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            application: application.into(),
            severity: event.severity(),
            event,
        }
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Push lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PushEvent {
    /// The pipeline moved to a new stage
    StageChanged {
        app_id: Option<AppId>,
        stage: PushStage,
    },

    /// An application record was created
    ApplicationCreated { app_id: AppId },

    /// An existing application record was updated
    ApplicationUpdated { app_id: AppId },

    /// A route was associated with the application
    RouteMapped { app_id: AppId, route: String },

    /// A service instance was bound
    ServiceBound { app_id: AppId, service: String },

    /// Instance states observed during run-wait
    InstancesObserved {
        app_id: AppId,
        states: Vec<InstanceState>,
    },

    /// The pipeline stopped with an error
    Failed { stage: PushStage, reason: String },

    /// The pipeline was cancelled by the caller
    Cancelled { stage: PushStage },
}

impl PushEvent {
    pub fn severity(&self) -> EventSeverity {
        match self {
            PushEvent::StageChanged { stage, .. } => match stage {
                PushStage::StagingFailed
                | PushStage::StagingTimedOut
                | PushStage::RunFailed
                | PushStage::RunTimedOut => EventSeverity::Error,
                _ => EventSeverity::Info,
            },
            PushEvent::InstancesObserved { .. } => EventSeverity::Debug,
            PushEvent::Failed { .. } => EventSeverity::Error,
            PushEvent::Cancelled { .. } => EventSeverity::Warning,
            _ => EventSeverity::Info,
        }
    }
}
