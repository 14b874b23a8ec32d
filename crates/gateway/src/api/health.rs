use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub(super) struct Health {
    status: &'static str,
    version: &'static str,
    active_sessions: usize,
    persisted_sessions: usize,
    queue_depth: usize,
    pending_permissions: usize,
}

pub(super) async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.coordinator.session_count().await,
        persisted_sessions: state.store.len(),
        queue_depth: state.dispatcher.depth(),
        pending_permissions: state.broker.pending_count(),
    })
}
