//! HTTP handlers for webhook processing and health checks

use axum::{
    Json,
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Local;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::SharedState;
use crate::deploy::{self, DeployResult, deploy_env};
use crate::error::{DeployError, Result};
use crate::signature;
use crate::webhook::{
    DELIVERY_HEADER, DispatchOutcome, EVENT_HEADERS, PushEvent, SIGNATURE_HEADERS, dispatch,
    first_header,
};

/// `{"status": ..., "message": ...}` body shared by the 200 responses
#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
    pub message: String,
}

/// Non-error result of a webhook request
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookReply {
    Deployed,
    Skipped(String),
    Ignored(String),
}

impl IntoResponse for WebhookReply {
    fn into_response(self) -> Response {
        let body = match self {
            WebhookReply::Deployed => StatusBody {
                status: "success",
                message: "Deployment completed".to_string(),
            },
            WebhookReply::Skipped(branch) => StatusBody {
                status: "skipped",
                message: format!("Skipped branch {}", branch),
            },
            WebhookReply::Ignored(event_type) => StatusBody {
                status: "ignored",
                message: format!("Ignored event type: {}", event_type),
            },
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// GET /health - static liveness check
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Local::now().to_rfc3339(),
    }))
}

/// POST /webhook - verify, classify and possibly deploy.
///
/// Every failure is converted to a JSON response here; nothing escapes to
/// the server.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::now_v7();
    match first_header(&headers, &[DELIVERY_HEADER]) {
        Some(delivery) => info!("Webhook {} received (delivery {})", request_id, delivery),
        None => info!("Webhook {} received", request_id),
    }

    match process_webhook(&state, &headers, &body).await {
        Ok(reply) => {
            info!("Webhook {} handled: {:?}", request_id, reply);
            reply.into_response()
        }
        Err(DeployError::InvalidSignature) => {
            warn!("Webhook {}: signature verification failed", request_id);
            DeployError::InvalidSignature.into_response()
        }
        Err(e) => {
            error!("Webhook {} failed: {}", request_id, e);
            e.into_response()
        }
    }
}

async fn process_webhook(
    state: &SharedState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookReply> {
    let signature_header = first_header(headers, &SIGNATURE_HEADERS);
    if !signature::verify(body, signature_header, state.config.secret_bytes()) {
        return Err(DeployError::InvalidSignature);
    }

    let event_type = first_header(headers, &EVENT_HEADERS);
    match dispatch(body, event_type, &state.config.target_branch)? {
        DispatchOutcome::Ignored(event_type) => Ok(WebhookReply::Ignored(event_type)),
        DispatchOutcome::Skipped(branch) => Ok(WebhookReply::Skipped(branch)),
        DispatchOutcome::Deploy(event) => {
            run_deploy(state, &event).await?;
            Ok(WebhookReply::Deployed)
        }
    }
}

/// Runs the deploy script for `event`, one at a time if so configured.
async fn run_deploy(state: &SharedState, event: &PushEvent) -> Result<DeployResult> {
    let config = &state.config;
    let _guard = if config.serialize_deploys {
        info!("Waiting for any running deployment to finish");
        Some(state.deploy_lock.lock().await)
    } else {
        None
    };

    info!("Starting deployment of branch '{}'", event.branch());
    let result = deploy::invoke(
        &config.deploy_script,
        event.branch(),
        &config.project_dir,
        &deploy_env(event),
        config.deploy_timeout,
    )
    .await?
    .into_result()?;
    info!("Deployment of branch '{}' succeeded", event.branch());
    Ok(result)
}
