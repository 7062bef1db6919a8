use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use super::{Detector, ServiceError};
use crate::{
    config::ConfigDetector,
    engine::{BoundingBox, Detection},
};

/// Client for a DeepStack compatible `/v1/vision/detection` endpoint.
pub struct DeepStack {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    success: bool,
    #[serde(default)]
    predictions: Vec<Prediction>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    label: String,
    confidence: f64,
    x_min: i64,
    y_min: i64,
    x_max: i64,
    y_max: i64,
}

impl DetectionResponse {
    fn into_detections(self) -> Result<Vec<Detection>, ServiceError> {
        if !self.success {
            return Err(ServiceError::DetectorFailed(
                self.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        self.predictions
            .into_iter()
            .map(
                |p| match BoundingBox::new(p.x_min, p.y_min, p.x_max, p.y_max) {
                    Ok(bbox) => Ok(Detection {
                        label: p.label,
                        confidence: p.confidence,
                        bbox,
                    }),
                    Err(e) => Err(ServiceError::InvalidDetection(format!("{}: {}", p.label, e))),
                },
            )
            .collect()
    }
}

impl DeepStack {
    pub fn new(config: &ConfigDetector) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(ServiceError::ConnectionError)?;
        Ok(DeepStack {
            client,
            endpoint: format!("{}/v1/vision/detection", config.url.trim_end_matches('/')),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn request(&self, image: Vec<u8>) -> Result<Vec<Detection>, ServiceError> {
        let form = reqwest::multipart::Form::new().part(
            "image",
            reqwest::multipart::Part::bytes(image).file_name("snapshot.jpg"),
        );
        let started = std::time::Instant::now();
        let res = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ServiceError::ConnectionError)?;
        let body: DetectionResponse = res
            .json()
            .await
            .map_err(ServiceError::InvalidResponseBody)?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            predictions = body.predictions.len(),
            "Detector responded"
        );
        body.into_detections()
    }
}

impl Detector for DeepStack {
    fn detect(&self, image: Vec<u8>) -> BoxFuture<'_, Result<Vec<Detection>, ServiceError>> {
        Box::pin(self.request(image))
    }
}
