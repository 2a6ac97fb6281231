use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use chatbridge_gateway::GatewayError;
use chatbridge_media::MediaError;
use chatbridge_shared::{QueryError, TransportError};
use chatbridge_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GatewayError> for ServerError {
    fn from(e: GatewayError) -> Self {
        let message = e.to_string();
        match e {
            GatewayError::Store(StoreError::NotFound)
            | GatewayError::Media(MediaError::Store(StoreError::NotFound)) => {
                ServerError::NotFound(message)
            }
            GatewayError::InvalidRequest(_)
            | GatewayError::Media(
                MediaError::NotOgg
                | MediaError::NotMedia
                | MediaError::IncompleteMedia
                | MediaError::InvalidPath(_),
            ) => ServerError::BadRequest(message),
            GatewayError::Transport(TransportError::Disconnected)
            | GatewayError::Media(MediaError::Fetch(TransportError::Disconnected)) => {
                ServerError::Unavailable(message)
            }
            GatewayError::Query(QueryError::Timeout { .. }) => ServerError::Timeout(message),
            _ => ServerError::Internal(message),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            ServerError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
