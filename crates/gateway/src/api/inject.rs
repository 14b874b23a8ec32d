use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use rb_domain::trigger::Trigger;

use super::api_error;
use crate::runtime::enqueue_trigger;
use crate::state::AppState;

#[derive(Deserialize)]
pub(super) struct InjectRequest {
    session_key: String,
    prompt: String,
}

/// Queue a prompt into an existing conversation, as if its user had sent
/// it. Goes through the same ingress path as platform messages, so it is
/// subject to the same backpressure and serialization.
pub(super) async fn inject(
    State(state): State<AppState>,
    Json(body): Json<InjectRequest>,
) -> Response {
    if body.prompt.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "prompt must not be empty");
    }

    let Some(info) = state.coordinator.describe(&body.session_key).await else {
        return api_error(
            StatusCode::NOT_FOUND,
            format!("no active session for {}", body.session_key),
        );
    };

    let trigger = Trigger::injected(&info.platform, &body.session_key, &body.prompt);
    if enqueue_trigger(&state.dispatcher, state.coordinator.clone(), trigger) {
        tracing::info!(session_key = %body.session_key, "prompt injected");
        (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "queued" })),
        )
            .into_response()
    } else {
        api_error(StatusCode::SERVICE_UNAVAILABLE, "ingress queue is full")
    }
}
