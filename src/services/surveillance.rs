use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, info};

use super::{ServiceError, SnapshotSource};
use crate::config::ConfigSurveillance;

/// Snapshot client for Synology Surveillance Station. Logs in once and keeps the session
/// cookie for every later snapshot request.
pub struct SurveillanceStation {
    client: reqwest::Client,
    config: ConfigSurveillance,
}

#[derive(Debug, Deserialize)]
struct SynoResponse {
    success: bool,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl SurveillanceStation {
    pub async fn connect(config: ConfigSurveillance) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(ServiceError::ConnectionError)?;
        let login = fill_template(
            &config.session_url,
            &[
                ("base", config.url.as_str()),
                ("user", config.username.as_str()),
                ("password", config.password.as_str()),
            ],
        );
        let login = reqwest::Url::parse(&login).map_err(|e| ServiceError::UrlError(e.to_string()))?;
        info!(base = %config.url, user = %config.username, "Logging in to Surveillance Station");
        let res = client
            .get(login)
            .send()
            .await
            .map_err(ServiceError::ConnectionError)?;
        if !res.status().is_success() {
            return Err(ServiceError::Status(
                "Surveillance Station login".into(),
                res.status().as_u16(),
            ));
        }
        let body: SynoResponse = res
            .json()
            .await
            .map_err(ServiceError::InvalidResponseBody)?;
        if !body.success {
            return Err(ServiceError::AuthenticationFailed(
                body.error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "login rejected".into()),
            ));
        }
        Ok(SurveillanceStation { client, config })
    }

    async fn fetch(&self, camera_id: &str) -> Result<Vec<u8>, ServiceError> {
        let url = fill_template(
            &self.config.snapshot_url,
            &[("base", self.config.url.as_str()), ("camera_id", camera_id)],
        );
        let url = reqwest::Url::parse(&url).map_err(|e| ServiceError::UrlError(e.to_string()))?;
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ServiceError::ConnectionError)?;
        if !res.status().is_success() {
            return Err(ServiceError::Status(
                "Surveillance Station snapshot".into(),
                res.status().as_u16(),
            ));
        }
        let image = res
            .bytes()
            .await
            .map_err(ServiceError::InvalidResponseBody)?;
        debug!(camera = %camera_id, bytes = image.len(), "Snapshot downloaded");
        Ok(image.to_vec())
    }
}

impl SnapshotSource for SurveillanceStation {
    fn snapshot<'a>(&'a self, camera_id: &'a str) -> BoxFuture<'a, Result<Vec<u8>, ServiceError>> {
        Box::pin(self.fetch(camera_id))
    }
}

/// Replaces every `{key}` in `template` with its value.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (key, value)| {
            acc.replace(&format!("{{{}}}", key), value)
        })
}
