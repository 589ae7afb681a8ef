pub mod config;
pub mod deploy;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod signature;
pub mod webhook;

use axum::{Router, routing};
use std::sync::Arc;
use tokio::sync::Mutex;

use config::Config;
use handlers::{handle_webhook, health};

pub struct AppState {
    pub config: Config,
    /// Held for the duration of a deploy when `serialize_deploys` is on
    pub deploy_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            deploy_lock: Mutex::new(()),
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Builds the HTTP routes around a shared state.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/webhook", routing::post(handle_webhook))
        .route("/health", routing::get(health))
        .with_state(state)
}
