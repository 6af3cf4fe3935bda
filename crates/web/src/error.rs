//! Error handling with RFC 7807 Problem Details for JSON responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tally_objects::CounterError;

pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Protocol failure: {0}")]
    Protocol(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CounterError> for AppError {
    fn from(err: CounterError) -> Self {
        match err {
            CounterError::InvalidKey(_) => Self::BadRequest(err.to_string()),
            CounterError::StorageFailure { .. } => Self::Internal(err.to_string()),
            CounterError::MigrationFailed { .. }
            | CounterError::ActorUnavailable { .. }
            | CounterError::ConnectionClosed { .. } => Self::ServiceUnavailable(err.to_string()),
        }
    }
}

impl From<tally_core::Error> for AppError {
    fn from(err: tally_core::Error) -> Self {
        Self::BadRequest(err.to_string())
    }
}

/// RFC 7807 Problem Details for HTTP APIs
#[derive(Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    problem_type: Option<String>,
    title: String,
    status: u16,
    detail: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            problem_type: None,
            title: title.into(),
            status: status.as_u16(),
            detail: detail.into(),
        }
    }

    pub fn from_error(err: &AppError) -> Self {
        let status = err.status_code();
        let title = status
            .canonical_reason()
            .map_or_else(|| "Error".to_string(), ToString::to_string);

        Self::new(status, title, err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let response = ErrorResponse::from_error(&self);
        (status, Json(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_errors_map_to_status() {
        let cases = [
            (CounterError::InvalidKey("bad".into()), StatusCode::BAD_REQUEST),
            (
                CounterError::StorageFailure {
                    key: "k".into(),
                    reason: "disk".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                CounterError::MigrationFailed {
                    key: "k".into(),
                    reason: "v2".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CounterError::ActorUnavailable { key: "k".into() },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_protocol_failure_is_bad_request() {
        let err = AppError::Protocol("not an upgrade".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_problem_details_body() -> std::result::Result<(), serde_json::Error> {
        let err = AppError::ServiceUnavailable("migrating".into());
        let body = serde_json::to_value(ErrorResponse::from_error(&err))?;

        assert_eq!(body["status"], 503);
        assert_eq!(body["title"], "Service Unavailable");
        assert!(body["type"].is_null());
        Ok(())
    }
}
