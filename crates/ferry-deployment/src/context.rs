//! Push Context - Stage tracking for one application's pipeline
//!
//! Each application pushed gets its own context. The context remembers the
//! current stage, publishes a `PushEvent` for every transition and turns a
//! cancellation request into a `Cancelled` error at the next checkpoint.

use crate::error::{DeploymentError, Result};
use ferry_types::{AppId, PushEvent, PushEventEnvelope, PushStage};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct PushContext {
    app: String,
    app_id: Mutex<Option<AppId>>,
    stage: Mutex<PushStage>,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<PushEventEnvelope>,
}

impl PushContext {
    pub fn new(
        app: impl Into<String>,
        cancel: CancellationToken,
        event_tx: broadcast::Sender<PushEventEnvelope>,
    ) -> Self {
        Self {
            app: app.into(),
            app_id: Mutex::new(None),
            stage: Mutex::new(PushStage::Resolving),
            cancel,
            event_tx,
        }
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn app_id(&self) -> Option<AppId> {
        self.app_id.lock().ok().and_then(|id| id.clone())
    }

    pub fn set_app_id(&self, app_id: AppId) {
        if let Ok(mut current) = self.app_id.lock() {
            *current = Some(app_id);
        }
    }

    pub fn stage(&self) -> PushStage {
        self.stage
            .lock()
            .map(|stage| *stage)
            .unwrap_or(PushStage::Resolving)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Move to `stage` and publish the transition
    pub fn enter(&self, stage: PushStage) {
        if let Ok(mut current) = self.stage.lock() {
            *current = stage;
        }
        info!(app = %self.app, %stage, "Push stage");
        self.emit(PushEvent::StageChanged {
            app_id: self.app_id(),
            stage,
        });
    }

    /// Fail with `Cancelled` if the caller cancelled the push
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        Ok(())
    }

    pub fn cancelled(&self) -> DeploymentError {
        DeploymentError::Cancelled {
            app: self.app.clone(),
            stage: self.stage(),
        }
    }

    /// Publish the outcome of a failed pipeline
    pub fn record_failure(&self, error: &DeploymentError) {
        if let Some(stage) = error.terminal_stage() {
            self.enter(stage);
        }

        let stage = self.stage();
        warn!(app = %self.app, %stage, %error, "Push failed");
        match error {
            DeploymentError::Cancelled { stage, .. } => {
                self.emit(PushEvent::Cancelled { stage: *stage });
            }
            _ => self.emit(PushEvent::Failed {
                stage,
                reason: error.to_string(),
            }),
        }
    }

    pub fn emit(&self, event: PushEvent) {
        // No subscribers is fine
        let _ = self
            .event_tx
            .send(PushEventEnvelope::new(self.app.clone(), event));
    }
}
