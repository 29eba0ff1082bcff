//! HTTP error mapping
//!
//! Handlers return [`AppError`]; the client only ever sees a short message.
//! Provider payloads, tokens and downstream bodies stay in the logs.

use crate::EmailBillError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Error type for HTTP handlers
#[derive(Debug)]
pub struct AppError(pub EmailBillError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self.0 {
            EmailBillError::Validation(msg) => write_http_error(StatusCode::BAD_REQUEST, msg),
            EmailBillError::Auth(e) => {
                tracing::warn!(reason = e.reason(), "Authentication error: {}", e);
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({
                        "error": "Authentication required",
                        "reason": e.reason(),
                    })),
                )
                    .into_response()
            }
            other => {
                tracing::error!("Request failed: {}", other);
                write_http_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<EmailBillError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// `{"error": message}` with the given status
pub fn write_http_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}
