use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::api_error;
use crate::state::AppState;

pub(super) async fn list(State(state): State<AppState>) -> Response {
    let pending = state.broker.list_pending();
    Json(serde_json::json!({
        "count": pending.len(),
        "pending": pending,
    }))
    .into_response()
}

#[derive(Deserialize)]
pub(super) struct ResolveRequest {
    allowed: bool,
    #[serde(default)]
    always: bool,
}

/// Out-of-band resolution path for a parked permission request, mirroring
/// the chat buttons.
pub(super) async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ResolveRequest>,
) -> Response {
    if state.broker.resolve(&id, body.allowed, body.always) {
        Json(serde_json::json!({ "resolved": true })).into_response()
    } else {
        api_error(
            StatusCode::NOT_FOUND,
            "permission request unknown or already resolved",
        )
    }
}
