//! Application error type mapping pipeline errors to HTTP responses.
//!
//! Every error response carries the correlation id, both as a header and
//! in the body. Signature failures map to an opaque 401 with no hint of
//! which check failed.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use agentry_types::error::{EventError, TriggerError};

/// HTTP-facing error with a status, machine-readable code, and message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub correlation_id: String,
}

impl AppError {
    pub fn from_trigger(err: TriggerError, correlation_id: &str) -> Self {
        let (status, code, message) = match &err {
            TriggerError::MissingHeader(name) => (
                StatusCode::BAD_REQUEST,
                "MISSING_HEADER",
                format!("missing required header: {name}"),
            ),
            TriggerError::Signature(_) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "signature rejected".to_string(),
            ),
            TriggerError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            TriggerError::UnknownAgent(key) => (
                StatusCode::NOT_FOUND,
                "AGENT_NOT_FOUND",
                format!("unknown agent: '{key}'"),
            ),
            TriggerError::Store(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                e.to_string(),
            ),
        };
        Self {
            status,
            code,
            message,
            correlation_id: correlation_id.to_string(),
        }
    }

    pub fn from_event(err: EventError, correlation_id: &str) -> Self {
        let (status, code, message) = match &err {
            EventError::MissingHeader(name) => (
                StatusCode::BAD_REQUEST,
                "MISSING_HEADER",
                format!("missing required header: {name}"),
            ),
            EventError::Signature(_) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "signature rejected".to_string(),
            ),
            EventError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            EventError::UnknownRun(id) => (
                StatusCode::NOT_FOUND,
                "RUN_NOT_FOUND",
                format!("run not found: {id}"),
            ),
            EventError::Store(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                e.to_string(),
            ),
        };
        Self {
            status,
            code,
            message,
            correlation_id: correlation_id.to_string(),
        }
    }

    pub fn not_found(message: impl Into<String>, correlation_id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>, correlation_id: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code,
            "message": self.message,
            "correlation_id": self.correlation_id,
        });

        let mut response = (
            self.status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response();

        if let Ok(value) = HeaderValue::from_str(&self.correlation_id) {
            response.headers_mut().insert("x-correlation-id", value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_types::error::SignatureError;

    #[test]
    fn test_trigger_error_mapping() {
        let err = AppError::from_trigger(TriggerError::MissingHeader("x-timestamp"), "c-1");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "MISSING_HEADER");

        let err = AppError::from_trigger(
            TriggerError::Signature(SignatureError::Rejected),
            "c-1",
        );
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "signature rejected");

        let err = AppError::from_trigger(TriggerError::UnknownAgent("x".into()), "c-1");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_event_error_mapping() {
        let err = AppError::from_event(EventError::UnknownRun(uuid::Uuid::now_v7()), "c-1");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "RUN_NOT_FOUND");
    }
}
