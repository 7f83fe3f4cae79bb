use crate::state::{AppState, HealthReport};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    queue_depth: usize,
    workers_alive: usize,
}

pub async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health_report();
    let (code, status) = if report.is_healthy() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        code,
        Json(Health {
            status,
            queue_depth: report.queue_depth,
            workers_alive: report.workers_alive,
        }),
    )
}

pub async fn status(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.health_report())
}

pub async fn session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.lookup(&id) {
        Some(info) => Json(info).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "session not found", "session_id": id })),
        )
            .into_response(),
    }
}
