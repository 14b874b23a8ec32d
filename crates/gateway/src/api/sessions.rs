use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::api_error;
use crate::state::AppState;

pub(super) async fn list(State(state): State<AppState>) -> Response {
    let sessions = state.coordinator.snapshot().await;
    Json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
    .into_response()
}

pub(super) async fn get_one(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Response {
    match state.coordinator.describe(&key).await {
        Some(info) => Json(info).into_response(),
        None => api_error(StatusCode::NOT_FOUND, format!("no active session for {key}")),
    }
}

pub(super) async fn interrupt(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Response {
    match state.coordinator.interrupt(&key).await {
        Some(interrupted) => {
            Json(serde_json::json!({ "interrupted": interrupted })).into_response()
        }
        None => api_error(StatusCode::NOT_FOUND, format!("no active session for {key}")),
    }
}
