use futures::future::BoxFuture;
use tracing::{debug, info};

use super::{ServiceError, TriggerAction};
use crate::cameras::Camera;

/// Calls the camera's trigger URL, then notifies HomeBridge when an accessory is configured.
pub struct HttpTriggerAction {
    client: reqwest::Client,
    homebridge_webhook_url: Option<String>,
}

impl HttpTriggerAction {
    pub fn new(homebridge_webhook_url: Option<String>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(ServiceError::ConnectionError)?;
        Ok(HttpTriggerAction {
            client,
            homebridge_webhook_url,
        })
    }

    fn homebridge_url(&self, camera: &Camera) -> Option<String> {
        match (&self.homebridge_webhook_url, &camera.homekit_acc_id) {
            (Some(webhook), Some(acc_id)) => Some(format!(
                "{}/?accessoryId={}&state=true",
                webhook.trim_end_matches('/'),
                acc_id
            )),
            _ => None,
        }
    }

    async fn get(&self, service: &str, url: &str) -> Result<(), ServiceError> {
        let url = reqwest::Url::parse(url).map_err(|e| ServiceError::UrlError(e.to_string()))?;
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ServiceError::ConnectionError)?;
        if !res.status().is_success() {
            return Err(ServiceError::Status(service.into(), res.status().as_u16()));
        }
        Ok(())
    }

    async fn trigger(&self, camera: &Camera, label: &str) -> Result<(), ServiceError> {
        self.get("Camera trigger", &camera.trigger_url).await?;
        info!(camera = %camera.id, name = %camera.name, %label, "Camera triggered");
        match self.homebridge_url(camera) {
            Some(url) => {
                self.get("HomeBridge webhook", &url).await?;
                debug!(camera = %camera.id, "Sent message to HomeBridge webhook");
            }
            None => debug!("Skipping HomeBridge webhook since no webhook URL or accessory id"),
        }
        Ok(())
    }
}

impl TriggerAction for HttpTriggerAction {
    fn fire<'a>(
        &'a self,
        camera: &'a Camera,
        label: &'a str,
    ) -> BoxFuture<'a, Result<(), ServiceError>> {
        Box::pin(self.trigger(camera, label))
    }
}
