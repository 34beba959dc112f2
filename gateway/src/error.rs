use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use relay::RelayError;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// Failures answered with an HTTP error before any stream is opened.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid or missing API key")]
    Unauthorized,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::InvalidRequest(_) | Self::Relay(RelayError::InvalidRequest(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
