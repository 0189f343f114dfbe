// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tower_http::cors::{Any, CorsLayer};

use crate::monitoring::Monitor;

pub use http::ApiError;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) monitor: Monitor,
    pub(crate) ws_connections: Arc<AtomicUsize>,
}

pub fn app(monitor: Monitor, ws_connections: Arc<AtomicUsize>) -> Router {
    let state = AppState {
        monitor,
        ws_connections,
    };
    Router::new()
        .route("/", get(|| async { "dockwatch: container monitor" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/system/metrics", get(http::system_metrics)) // GET /api/system/metrics
        .route("/api/containers", get(http::list_containers)) // GET /api/containers
        .route("/api/containers/metrics", get(http::all_container_metrics))
        .route("/api/containers/{id}/metrics", get(http::container_metrics))
        .route("/api/containers/{id}/logs", get(http::container_logs))
        .route("/api/monitoring/start", post(http::start_monitoring))
        .route("/api/monitoring/stop", post(http::stop_monitoring))
        .route("/api/monitoring/tasks", get(http::monitoring_tasks))
        .route("/ws/events", get(ws::ws_events)) // WS /ws/events?topics=a,b
        .route("/ws/containers/{id}/stats", get(ws::ws_container_stats))
        .route("/ws/containers/{id}/logs", get(ws::ws_container_logs))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
