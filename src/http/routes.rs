// src/http/routes.rs

//! Route table and handlers.
//!
//! ```text
//! GET    /health
//! POST   /api/v1/jobs                     -> start_job
//! GET    /api/v1/jobs                     -> list_jobs
//! POST   /api/v1/jobs/stop-all            -> stop_all
//! GET    /api/v1/jobs/{id}                -> job_status
//! POST   /api/v1/jobs/{id}/stop           -> stop_job
//! POST   /api/v1/jobs/{id}/retry          -> retry_job
//! POST   /api/v1/schedules                -> schedule_job
//! GET    /api/v1/schedules                -> list_schedules
//! POST   /api/v1/schedules/fan-out        -> fan_out
//! DELETE /api/v1/schedules/{id}           -> cancel_schedule
//! GET    /api/v1/templates                -> list_templates
//! PUT    /api/v1/templates/{name}         -> save_template
//! DELETE /api/v1/templates/{name}         -> delete_template
//! POST   /api/v1/templates/{name}/launch  -> launch_template
//! GET    /api/v1/history                  -> history
//! GET    /api/v1/stats                    -> stats
//! ```

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult, AppState, Caller};
use crate::history::HistoryEntry;
use crate::job::JobSpec;
use crate::publish::Snapshot;
use crate::scheduler::PendingSchedule;
use crate::service::{Health, Stats, Template};
use crate::types::{Destination, JobId, ScheduleId};

const DEFAULT_HISTORY_LIMIT: usize = 20;

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(start_job).get(list_jobs))
        .route("/jobs/stop-all", post(stop_all))
        .route("/jobs/{id}", get(job_status))
        .route("/jobs/{id}/stop", post(stop_job))
        .route("/jobs/{id}/retry", post(retry_job))
        .route("/schedules", post(schedule_job).get(list_schedules))
        .route("/schedules/fan-out", post(fan_out))
        .route("/schedules/{id}", delete(cancel_schedule))
        .route("/templates", get(list_templates))
        .route(
            "/templates/{name}",
            put(save_template).delete(delete_template),
        )
        .route("/templates/{name}/launch", post(launch_template))
        .route("/history", get(history))
        .route("/stats", get(stats))
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartJobBody {
    #[serde(flatten)]
    pub spec: JobSpec,
    #[serde(default)]
    pub destination: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleBody {
    #[serde(flatten)]
    pub spec: JobSpec,
    pub delay_secs: u64,
    #[serde(default)]
    pub destination: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FanOutBody {
    pub targets: Vec<String>,
    pub duration_secs: u64,
    pub rate: u32,
    pub threads: u32,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub destination: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DestinationQuery {
    pub destination: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct JobCreated {
    pub id: JobId,
}

#[derive(Debug, Serialize)]
pub struct ScheduleCreated {
    pub id: ScheduleId,
    pub fires_in_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct FanOutCreated {
    pub ids: Vec<ScheduleId>,
}

#[derive(Debug, Serialize)]
pub struct Stopped {
    pub stopped: usize,
}

fn destination(raw: Option<String>) -> Option<Destination> {
    raw.filter(|d| !d.trim().is_empty()).map(Destination::new)
}

fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> ApiResult<T> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {what} id '{raw}'")))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// GET /health
async fn health(State(service): State<AppState>) -> Json<Health> {
    Json(service.health())
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
async fn start_job(
    Caller(caller): Caller,
    State(service): State<AppState>,
    Json(body): Json<StartJobBody>,
) -> ApiResult<impl IntoResponse> {
    let id = service.start(body.spec, &caller, destination(body.destination))?;
    Ok((StatusCode::CREATED, Json(JobCreated { id })))
}

/// GET /api/v1/jobs
async fn list_jobs(State(service): State<AppState>) -> Json<Vec<Snapshot>> {
    Json(service.list())
}

/// GET /api/v1/jobs/{id}
async fn job_status(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Snapshot>> {
    let id: JobId = parse_id(&id, "job")?;
    Ok(Json(service.status(id)?))
}

/// POST /api/v1/jobs/{id}/stop
async fn stop_job(
    Caller(caller): Caller,
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id: JobId = parse_id(&id, "job")?;
    service.stop(id, &caller)?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/jobs/stop-all
async fn stop_all(
    Caller(caller): Caller,
    State(service): State<AppState>,
) -> ApiResult<Json<Stopped>> {
    let stopped = service.stop_all(&caller)?;
    Ok(Json(Stopped { stopped }))
}

/// POST /api/v1/jobs/{id}/retry
async fn retry_job(
    Caller(caller): Caller,
    State(service): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DestinationQuery>,
) -> ApiResult<impl IntoResponse> {
    let id: JobId = parse_id(&id, "job")?;
    let new_id = service.retry(id, &caller, destination(query.destination))?;
    Ok((StatusCode::CREATED, Json(JobCreated { id: new_id })))
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

/// POST /api/v1/schedules
async fn schedule_job(
    Caller(caller): Caller,
    State(service): State<AppState>,
    Json(body): Json<ScheduleBody>,
) -> ApiResult<impl IntoResponse> {
    let handle = service.schedule(
        body.spec,
        &caller,
        destination(body.destination),
        Duration::from_secs(body.delay_secs),
    )?;
    Ok((
        StatusCode::CREATED,
        Json(ScheduleCreated {
            id: handle.id,
            fires_in_secs: handle.fires_in.as_secs(),
        }),
    ))
}

/// GET /api/v1/schedules
async fn list_schedules(State(service): State<AppState>) -> Json<Vec<PendingSchedule>> {
    Json(service.pending_schedules())
}

/// POST /api/v1/schedules/fan-out
async fn fan_out(
    Caller(caller): Caller,
    State(service): State<AppState>,
    Json(body): Json<FanOutBody>,
) -> ApiResult<impl IntoResponse> {
    if body.targets.is_empty() {
        return Err(ApiError::BadRequest("targets must not be empty".to_string()));
    }
    let mut params = JobSpec::new("", body.duration_secs, body.rate, body.threads);
    params.extra_args = body.extra_args;

    let handles = service.fan_out(
        &body.targets,
        &params,
        &caller,
        destination(body.destination),
    )?;
    let ids = handles.iter().map(|h| h.id).collect();
    Ok((StatusCode::CREATED, Json(FanOutCreated { ids })))
}

/// DELETE /api/v1/schedules/{id}
async fn cancel_schedule(
    Caller(caller): Caller,
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id: ScheduleId = parse_id(&id, "schedule")?;
    service.cancel_schedule(id, &caller)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// GET /api/v1/templates
async fn list_templates(State(service): State<AppState>) -> Json<Vec<Template>> {
    Json(service.list_templates())
}

/// PUT /api/v1/templates/{name}
async fn save_template(
    Caller(caller): Caller,
    State(service): State<AppState>,
    Path(name): Path<String>,
    Json(spec): Json<JobSpec>,
) -> ApiResult<Json<Template>> {
    Ok(Json(service.save_template(&name, spec, &caller)?))
}

/// DELETE /api/v1/templates/{name}
async fn delete_template(
    Caller(caller): Caller,
    State(service): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    service.delete_template(&name, &caller)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/templates/{name}/launch
async fn launch_template(
    Caller(caller): Caller,
    State(service): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DestinationQuery>,
) -> ApiResult<impl IntoResponse> {
    let id = service.launch_template(&name, &caller, destination(query.destination))?;
    Ok((StatusCode::CREATED, Json(JobCreated { id })))
}

// ---------------------------------------------------------------------------
// History / stats
// ---------------------------------------------------------------------------

/// GET /api/v1/history
async fn history(
    State(service): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<HistoryEntry>> {
    Json(service.history(query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)))
}

/// GET /api/v1/stats
async fn stats(State(service): State<AppState>) -> Json<Stats> {
    Json(service.stats())
}
