use std::io;
use std::path::PathBuf;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Every way a webhook request or the server bootstrap can fail
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("{0}")]
    UnparseablePayload(#[from] serde_json::Error),

    #[error("Malformed push event: {0}")]
    MalformedPushEvent(String),

    #[error("Deploy script not found: {}", .0.display())]
    DeployScriptMissing(PathBuf),

    #[error("Deploy script exited with code {code}: {stderr}")]
    DeployScriptFailed { code: i32, stderr: String },

    #[error("Deploy script timed out after {0}s")]
    DeployTimedOut(u64),

    #[error("Failed to launch deploy script: {0}")]
    Launch(#[source] io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

impl DeployError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeployError::InvalidSignature => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DeployError {
    fn into_response(self) -> Response {
        let body = match &self {
            DeployError::InvalidSignature => json!({"error": "Invalid signature"}),
            DeployError::DeployScriptMissing(_) => json!({
                "status": "error",
                "message": "Deploy script not found"
            }),
            DeployError::DeployScriptFailed { stderr, .. } => json!({
                "status": "error",
                "message": stderr
            }),
            DeployError::DeployTimedOut(_) => json!({
                "status": "error",
                "message": self.to_string()
            }),
            other => json!({"error": other.to_string()}),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Helper type for Results that use DeployError
pub type Result<T> = std::result::Result<T, DeployError>;
