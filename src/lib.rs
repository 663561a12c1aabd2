pub mod config;
pub mod error;
pub mod hub;
pub mod websocket;

use std::sync::Arc;
use actix_web::{web, HttpResponse};
use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use crate::config::Settings;

pub use hub::{Hub, HubHandle, HubStats};

/// Health check endpoint handler
/// Returns a JSON response with server status, timestamp and live connection count
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let stats = state.hub.stats().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connections": stats.connections,
    })))
}

/// Current roster of the chat room
pub async fn roster(state: web::Data<AppState>) -> Result<HttpResponse> {
    let stats = state.hub.stats().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "participants": stats.participants,
    })))
}

/// Mounts every route the server exposes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/roster", web::get().to(roster))
        .route("/ws", web::get().to(websocket::websocket_route));
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub hub: HubHandle,
}

impl AppState {
    /// Spawns the hub on the current runtime.
    pub fn new(config: Settings) -> Self {
        let (hub, _task) = Hub::new(&config.hub).spawn();

        Self {
            config: Arc::new(config),
            hub,
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.hub.shutdown().await?;
        info!("Hub stopped");
        Ok(())
    }
}
