// src/http/mod.rs

//! HTTP surface over [`JobService`].
//!
//! [`router`] builds the full application router (health at the root, the
//! API under `/api/v1`) so the binary and the integration tests exercise the
//! same stack. Callers identify themselves with the `x-requester` header;
//! authentication happens in front of this service.

pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::service::JobService;
use crate::types::Requester;

pub use error::{ApiError, ApiResult};

pub const REQUESTER_HEADER: &str = "x-requester";

pub type AppState = Arc<JobService>;

/// Build the application router with tracing applied.
pub fn router(service: Arc<JobService>) -> Router {
    Router::new()
        .merge(routes::health_router())
        .nest("/api/v1", routes::api_routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(service)
}

/// Identity of the caller, taken from the `x-requester` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Requester);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(REQUESTER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ApiError::Unauthorized(format!("missing {REQUESTER_HEADER} header"))
            })?;
        Ok(Caller(Requester::new(value)))
    }
}
