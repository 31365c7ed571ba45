use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::engine::errors::EngineError;

const LOG_TARGET: &str = "server::error";

/// HTTP wrapper around the engine's structured errors: every response
/// body carries the machine-readable `kind` plus a human message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "Validation",
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            kind: "Unavailable",
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::Joined
            | EngineError::TableFull
            | EngineError::DuplicateCard(_)
            | EngineError::StoreConflict => StatusCode::CONFLICT,
            EngineError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Conservation(_) | EngineError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                target: LOG_TARGET,
                kind = self.kind,
                message = %self.message,
                "internal server error"
            );
        }
        let body = Json(json!({
            "kind": self.kind,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}
