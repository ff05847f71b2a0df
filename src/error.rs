use crate::voice_sessions::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Malformed payload")]
    MalformedPayload,

    #[error("{0}")]
    InvalidQuery(String),

    #[error("Not found")]
    NotFound,

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Upstream service error")]
    Upstream(String),

    /// Diagnostics only: the detail is meant for operators.
    #[error("{0}")]
    Unavailable(String),

    #[error("Unable to process request right now")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingFields(_) | AppError::MalformedPayload | AppError::InvalidQuery(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::NotConfigured(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotConfigured(what) => AppError::NotConfigured(what),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Upstream and internal details only go to the log.
        if let AppError::Internal(detail) | AppError::Upstream(detail) = &self {
            error!(%detail, status = status.as_u16(), "Request failed");
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}
