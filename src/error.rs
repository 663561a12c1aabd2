use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] WebSocketError),

    #[error("Hub error: {0}")]
    HubError(#[from] HubError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = self.to_string();
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::HubError(HubError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::WebSocketError(WebSocketError::InvalidFormat(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failure to hand one outbound event to one connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebSocketError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Message sending failed: {0}")]
    SendError(String),

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("Hub is not running")]
    Unavailable,
}
