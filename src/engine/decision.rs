use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::{
    classifier::{classify, CameraRules, ClassifiedCandidate, Detection},
    debounce::{CameraLocks, StoreError, TriggerStore},
    geometry::Point,
    zones::is_excluded,
};

#[derive(Debug, PartialEq, Eq, Serialize, Clone, Copy, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SuppressedReason {
    /// The camera triggered less than one debounce interval ago
    Debounced,
    /// No detection passed its type, size and confidence thresholds
    NoCandidate,
    /// Every candidate was inside an exclusion zone
    AllInExclusionZone,
}

/// Outcome of one decision. At most one detection is ever reported as the match.
#[derive(Debug, PartialEq, Serialize, Clone)]
pub struct DecisionRecord {
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_detection: Option<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppressed_reason: Option<SuppressedReason>,
}

impl DecisionRecord {
    pub fn suppressed(reason: SuppressedReason) -> Self {
        DecisionRecord {
            triggered: false,
            matched_label: None,
            matched_detection: None,
            anchor: None,
            suppressed_reason: Some(reason),
        }
    }

    fn matched(candidate: &ClassifiedCandidate) -> Self {
        DecisionRecord {
            triggered: true,
            matched_label: Some(candidate.detection.label.clone()),
            matched_detection: Some(candidate.detection.clone()),
            anchor: Some(candidate.anchor),
            suppressed_reason: None,
        }
    }
}

/// Turns a detection batch into a trigger decision, gated by each camera's debounce window.
pub struct DecisionEngine {
    store: Arc<dyn TriggerStore>,
    locks: CameraLocks,
}

impl DecisionEngine {
    pub fn new(store: Arc<dyn TriggerStore>) -> Self {
        DecisionEngine {
            store,
            locks: CameraLocks::new(),
        }
    }

    /// Scans `detections` in the order given and triggers on the first candidate outside every
    /// exclusion zone. The debounce check and the commit of `now` happen under the camera's
    /// lock, so two concurrent calls for one camera can never both trigger.
    pub fn decide(
        &self,
        camera_id: &str,
        detections: &[Detection],
        rules: &CameraRules,
        debounce_interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<DecisionRecord, DecisionError> {
        let lock = self.locks.handle(camera_id);
        // The mutex guards no data of its own, the state lives in the store
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self.within_window(camera_id, debounce_interval, now)? {
            return Ok(DecisionRecord::suppressed(SuppressedReason::Debounced));
        }

        let mut saw_candidate = false;
        for (idx, detection) in detections.iter().enumerate() {
            let candidate = match classify(detection, rules) {
                Some(candidate) => candidate,
                None => continue,
            };
            saw_candidate = true;
            debug!(
                camera = %camera_id,
                id = idx + 1,
                label = %detection.label,
                confidence = detection.confidence_pct(),
                x = candidate.anchor.x_px(),
                y = candidate.anchor.y_px(),
                "Candidate found, checking ignore zones"
            );
            if is_excluded(
                candidate.anchor,
                &candidate.rule.ignore_rects,
                &candidate.rule.ignore_polygons,
            ) {
                debug!(camera = %camera_id, label = %detection.label, "Candidate inside ignore zone");
                continue;
            }

            self.store.set(camera_id, now)?;
            info!(
                camera = %camera_id,
                label = %detection.label,
                confidence = detection.confidence_pct(),
                "Triggering"
            );
            return Ok(DecisionRecord::matched(&candidate));
        }

        let reason = if saw_candidate {
            SuppressedReason::AllInExclusionZone
        } else {
            SuppressedReason::NoCandidate
        };
        info!(camera = %camera_id, %reason, "Not triggered");
        Ok(DecisionRecord::suppressed(reason))
    }

    /// Lock free peek at the debounce window. Only advisory: `decide` checks again under the lock.
    pub fn is_debounced(
        &self,
        camera_id: &str,
        debounce_interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, DecisionError> {
        self.within_window(camera_id, debounce_interval, now)
    }

    fn within_window(
        &self,
        camera_id: &str,
        debounce_interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, DecisionError> {
        match self.store.get(camera_id)? {
            Some(last) => {
                // A trigger time in the future (clock stepped back) also counts as recent
                let elapsed = now - last;
                if elapsed < debounce_interval {
                    info!(
                        camera = %camera_id,
                        elapsed_secs = elapsed.num_milliseconds() as f64 / 1000.0,
                        "Skipping detection, camera triggered recently"
                    );
                    Ok(true)
                } else {
                    debug!(camera = %camera_id, last_trigger = %last, "Outside trigger interval");
                    Ok(false)
                }
            }
            None => {
                debug!(camera = %camera_id, "No previous trigger for camera");
                Ok(false)
            }
        }
    }
}

quick_error! {
    #[derive(Debug)]
    pub enum DecisionError {
        Store(error: StoreError) {
            display("Debounce state unavailable: {}", error)
            source(error)
            from()
        }
    }
}
