// GET/POST handlers and the error-to-status mapping

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::AppState;
use crate::error::MonitorError;
use crate::models::LogQuery;
use crate::runtime::RuntimeError;

/// Package name and version (from Cargo.toml at build time).
pub(super) const NAME: &str = env!("CARGO_PKG_NAME");
pub(super) const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A [`MonitorError`] rendered as `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub struct ApiError(pub MonitorError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            MonitorError::ResourceNotRunning { .. } => StatusCode::CONFLICT,
            MonitorError::ResourceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            MonitorError::Runtime(RuntimeError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            MonitorError::Runtime(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, status = status.as_u16(), "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// GET /version: returns service name and version.
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/system/metrics: always computed fresh.
pub(super) async fn system_metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(state.monitor.system_metrics().await?).into_response())
}

/// GET /api/containers: every container with its lifecycle status.
pub(super) async fn list_containers(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(state.monitor.list_resources().await?).into_response())
}

/// GET /api/containers/metrics: id → snapshot for running containers; failures omitted.
pub(super) async fn all_container_metrics(
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    Ok(Json(state.monitor.all_resource_metrics().await?).into_response())
}

pub(super) async fn container_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    Ok(Json(state.monitor.resource_metrics(&id).await?).into_response())
}

/// GET /api/containers/{id}/logs?tail=&since=
pub(super) async fn container_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Response, ApiError> {
    Ok(Json(state.monitor.resource_logs(&id, query).await?).into_response())
}

pub(super) async fn start_monitoring(State(state): State<AppState>) -> impl IntoResponse {
    let started = state.monitor.start_collection();
    Json(json!({ "started": started, "collecting": state.monitor.is_collecting() }))
}

pub(super) async fn stop_monitoring(State(state): State<AppState>) -> impl IntoResponse {
    let stopped = state.monitor.stop_collection().await;
    Json(json!({ "stopped": stopped, "collecting": state.monitor.is_collecting() }))
}

/// GET /api/monitoring/tasks: active poll tasks and fan-out counters.
pub(super) async fn monitoring_tasks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.stats())
}
