use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::{error, info, info_span, warn, Instrument};

use crate::pipeline::{Pipeline, PipelineError, WebhookOutcome};

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/:camera_id", get(webhook))
        .with_state(pipeline)
}

pub async fn serve(addr: SocketAddr, pipeline: Arc<Pipeline>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening for camera webhooks");
    axum::serve(listener, router(pipeline)).await
}

/// Motion webhook, called by Surveillance Station with the camera id in the path
async fn webhook(
    State(pipeline): State<Arc<Pipeline>>,
    Path(camera_id): Path<String>,
) -> Result<Json<WebhookOutcome>, PipelineError> {
    let span = info_span!("Webhook", camera = %camera_id);
    pipeline.handle(&camera_id).instrument(span).await.map(Json)
}

async fn health(State(pipeline): State<Arc<Pipeline>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cameras_enabled": pipeline.cameras().enabled_count(),
        "cameras_disabled": pipeline.cameras().disabled_count(),
    }))
}

impl PipelineError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            PipelineError::UnknownCamera(_) => (StatusCode::NOT_FOUND, "UNKNOWN_CAMERA"),
            PipelineError::CameraDisabled(_, _) => {
                (StatusCode::SERVICE_UNAVAILABLE, "CAMERA_DISABLED")
            }
            PipelineError::Service(_) => (StatusCode::BAD_GATEWAY, "SERVICE_ERROR"),
            PipelineError::Decision(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STATE_ERROR"),
            PipelineError::TriggerAction(_, _) => (StatusCode::BAD_GATEWAY, "TRIGGER_ACTION_ERROR"),
            PipelineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            error!(%status, error_code, %message, "Request failed");
        } else {
            warn!(%status, error_code, %message, "Request rejected");
        }
        (
            status,
            Json(json!({
                "error_code": error_code,
                "message": message,
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod test {
    use axum::{http::StatusCode, response::IntoResponse};

    use crate::{
        engine::{DecisionError, RuleError, StoreError},
        pipeline::PipelineError,
        services::ServiceError,
    };

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (
                PipelineError::UnknownCamera("4".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                PipelineError::CameraDisabled("Porch".into(), RuleError::FieldMissing("type".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PipelineError::Service(ServiceError::DetectorFailed("boom".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                PipelineError::Decision(DecisionError::Store(StoreError::Poisoned)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                PipelineError::TriggerAction(
                    "4".into(),
                    ServiceError::Status("Camera trigger".into(), 404),
                ),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            PipelineError::UnknownCamera("4".into()).to_string(),
            "Camera 4 is not configured"
        );
        assert_eq!(
            PipelineError::Decision(DecisionError::Store(StoreError::Poisoned)).to_string(),
            "Debounce state unavailable: Trigger state lock poisoned"
        );
    }
}
