use std::{sync::Arc, time::Instant};

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
    cameras::{CameraRegistry, Lookup},
    engine::{DecisionEngine, DecisionError, DecisionRecord, RuleError, SuppressedReason},
    services::{Detector, ServiceError, SnapshotSource, TriggerAction},
};

/// Result of one webhook call.
#[derive(Debug, PartialEq, Serialize, Clone)]
pub struct WebhookOutcome {
    pub camera_id: String,
    pub camera_name: String,
    pub decision: DecisionRecord,
    pub runtime_secs: f64,
}

/// Everything needed to answer a motion webhook: the camera registry, the collaborators and
/// the decision engine holding the debounce state.
pub struct Pipeline {
    cameras: CameraRegistry,
    engine: Arc<DecisionEngine>,
    snapshots: Arc<dyn SnapshotSource>,
    detector: Arc<dyn Detector>,
    action: Arc<dyn TriggerAction>,
    interval: Duration,
}

impl Pipeline {
    pub fn new(
        cameras: CameraRegistry,
        engine: DecisionEngine,
        snapshots: Arc<dyn SnapshotSource>,
        detector: Arc<dyn Detector>,
        action: Arc<dyn TriggerAction>,
        interval: Duration,
    ) -> Self {
        Pipeline {
            cameras,
            engine: Arc::new(engine),
            snapshots,
            detector,
            action,
            interval,
        }
    }

    pub fn cameras(&self) -> &CameraRegistry {
        &self.cameras
    }

    pub async fn handle(&self, camera_id: &str) -> Result<WebhookOutcome, PipelineError> {
        let started = Instant::now();
        let camera = match self.cameras.lookup(camera_id) {
            Lookup::Enabled(camera) => camera.clone(),
            Lookup::Disabled { name, error } => {
                return Err(PipelineError::CameraDisabled(name.to_string(), error.clone()))
            }
            Lookup::Unknown => return Err(PipelineError::UnknownCamera(camera_id.to_string())),
        };
        let outcome = |decision: DecisionRecord| WebhookOutcome {
            camera_id: camera.id.clone(),
            camera_name: camera.name.clone(),
            decision,
            runtime_secs: started.elapsed().as_secs_f64(),
        };

        // Saves a snapshot and a detector call; `decide` repeats the check under the camera lock
        if self.engine.is_debounced(camera_id, self.interval, Utc::now())? {
            return Ok(outcome(DecisionRecord::suppressed(
                SuppressedReason::Debounced,
            )));
        }

        let image = self.snapshots.snapshot(camera_id).await?;
        debug!("Requesting detection");
        let detections = self.detector.detect(image).await?;
        debug!(count = detections.len(), "Detections received");

        let decision = {
            let engine = self.engine.clone();
            let camera = camera.clone();
            let interval = self.interval;
            tokio::task::spawn_blocking(move || {
                engine.decide(&camera.id, &detections, &camera.rules, interval, Utc::now())
            })
            .await
            .map_err(|e| PipelineError::Internal(e.to_string()))??
        };

        if let Some(label) = decision.matched_label.as_deref() {
            // The trigger time is already committed, a failed action must not reopen the window
            if let Err(e) = self.action.fire(&camera, label).await {
                error!(error = %e, "Trigger action failed");
                return Err(PipelineError::TriggerAction(camera.id.clone(), e));
            }
        }

        let outcome = outcome(decision);
        info!(
            triggered = outcome.decision.triggered,
            runtime_secs = outcome.runtime_secs,
            "Event processed"
        );
        Ok(outcome)
    }
}

quick_error! {
    #[derive(Debug)]
    pub enum PipelineError {
        UnknownCamera(camera_id: String) {
            display("Camera {} is not configured", camera_id)
        }
        CameraDisabled(name: String, error: RuleError) {
            display("Camera {} is disabled by a configuration error: {}", name, error)
            source(error)
        }
        Service(error: ServiceError) {
            display("{}", error)
            source(error)
            from()
        }
        Decision(error: DecisionError) {
            display("{}", error)
            source(error)
            from()
        }
        TriggerAction(camera_id: String, error: ServiceError) {
            display("Camera {} triggered but the trigger action failed: {}", camera_id, error)
            source(error)
        }
        Internal(error: String) {
            display("Internal error: {}", error)
        }
    }
}
