mod deepstack;
mod surveillance;
mod trigger;

pub use deepstack::DeepStack;
pub use surveillance::{fill_template, SurveillanceStation};
pub use trigger::HttpTriggerAction;

use futures::future::BoxFuture;

use crate::{cameras::Camera, engine::Detection};

/// Produces a still image for a camera.
pub trait SnapshotSource: Send + Sync {
    fn snapshot<'a>(&'a self, camera_id: &'a str) -> BoxFuture<'a, Result<Vec<u8>, ServiceError>>;
}

/// Runs object detection on an image. Detections come back in the detector's own ranking.
pub trait Detector: Send + Sync {
    fn detect(&self, image: Vec<u8>) -> BoxFuture<'_, Result<Vec<Detection>, ServiceError>>;
}

/// Side effects of a positive decision (relay trigger, home automation notification).
pub trait TriggerAction: Send + Sync {
    fn fire<'a>(
        &'a self,
        camera: &'a Camera,
        label: &'a str,
    ) -> BoxFuture<'a, Result<(), ServiceError>>;
}

quick_error! {
    #[derive(Debug)]
    pub enum ServiceError {
        UrlError(error: String) {
            display("Unable to parse URL: {}", error)
        }
        ConnectionError(error: reqwest::Error) {
            display("Unable to connect to service: {}", error)
            source(error)
        }
        InvalidResponseBody(error: reqwest::Error) {
            display("Service returned mangled response body: {}", error)
            source(error)
        }
        Status(service: String, status: u16) {
            display("{} responded with status code {}", service, status)
        }
        AuthenticationFailed(error: String) {
            display("Could not authenticate with Surveillance Station: {}", error)
        }
        DetectorFailed(error: String) {
            display("Detector reported failure: {}", error)
        }
        InvalidDetection(error: String) {
            display("Detector returned an invalid prediction: {}", error)
        }
    }
}
