//! HTTP error mapping
//!
//! Every failure leaves the API as `{ success: false, message, error? }`.
//! `error` carries diagnostic detail and is only filled in outside
//! production.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Handler error, already classified
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiError {
    /// Classify a core error. Client errors keep their own message; server
    /// errors are reported under `context` with the cause as detail.
    pub fn from_core(err: civic_core::Error, context: &str, expose_detail: bool) -> Self {
        use civic_core::Error;

        let status = match &err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) | Error::Conflict { .. } => StatusCode::CONFLICT,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %err, "{}", context);
            Self {
                status,
                message: context.to_string(),
                detail: expose_detail.then(|| err.to_string()),
            }
        } else {
            Self {
                status,
                message: err.to_string(),
                detail: None,
            }
        }
    }

    /// Request that could not be extracted (bad JSON body, bad query string)
    pub fn bad_request(message: impl Into<String>, detail: String, expose_detail: bool) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            detail: expose_detail.then_some(detail),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: self.message,
            error: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}
