// src/http/error.rs

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::scheduler::SchedulerError;
use crate::service::ServiceError;
use crate::supervisor::SupervisorError;

/// Error type for HTTP handlers.
///
/// Wraps [`ServiceError`] for domain errors and adds the request-level
/// variants. Renders as `{ "error": <message>, "code": <CODE> }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        ApiError::Service(err.into())
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        ApiError::Service(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Service(err) => classify_service_error(err),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": message,
            "code": code,
        });
        (status, Json(body)).into_response()
    }
}

fn classify_service_error(err: &ServiceError) -> (StatusCode, &'static str) {
    match err {
        ServiceError::Supervisor(err) => match err {
            SupervisorError::AdmissionRejected { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "ADMISSION_REJECTED")
            }
            SupervisorError::Spawn { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "SPAWN_FAILED"),
            SupervisorError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            SupervisorError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            SupervisorError::InvalidSpec(_) => (StatusCode::BAD_REQUEST, "INVALID_SPEC"),
        },
        ServiceError::Scheduler(err) => match err {
            SchedulerError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            SchedulerError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            SchedulerError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING_DOWN"),
            SchedulerError::InvalidDelay(_) => (StatusCode::BAD_REQUEST, "INVALID_DELAY"),
        },
        ServiceError::TemplateNotFound(_) | ServiceError::NothingToRetry(_) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND")
        }
    }
}
