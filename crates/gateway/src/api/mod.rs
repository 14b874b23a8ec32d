//! HTTP control surface.
//!
//! `/health` is public; everything under `/v1` requires the bearer token.
//! The protected surface covers message injection, session inspection and
//! interruption, and out-of-band permission resolution.

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod auth;
mod health;
mod inject;
mod permissions;
mod sessions;

/// Uniform error body: `{"error": "..."}` with the given status.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/inject", post(inject::inject))
        .route("/v1/sessions", get(sessions::list))
        .route("/v1/sessions/:key", get(sessions::get_one))
        .route("/v1/sessions/:key/interrupt", post(sessions::interrupt))
        .route("/v1/permissions", get(permissions::list))
        .route("/v1/permissions/:id/resolve", post(permissions::resolve))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(protected)
        .layer(ConcurrencyLimitLayer::new(
            state.config.server.max_concurrent_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap;
    use axum::body::Body;
    use axum::http::{header, Request};
    use rb_domain::config::Config;
    use tower::util::ServiceExt;

    const TOKEN: &str = "test-token";

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        let mut config = Config::default();
        config.sessions.state_path = dir.path().to_path_buf();
        let mut state = bootstrap::build_app_state(config).unwrap();
        state.api_token_hash = Some(auth::token_hash(TOKEN));
        state
    }

    fn authed(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(&dir));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_rejects_missing_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(&dir));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_route_rejects_wrong_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(&dir));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/sessions")
                    .header(header::AUTHORIZATION, "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn sessions_list_with_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(&dir));
        let response = app
            .oneshot(authed("GET", "/v1/sessions", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unconfigured_token_disables_protected_surface() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = test_state(&dir);
        state.api_token_hash = None;
        let app = router(state);
        let response = app
            .oneshot(authed("GET", "/v1/sessions", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn inject_into_unknown_session_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(&dir));
        let response = app
            .oneshot(authed(
                "POST",
                "/v1/inject",
                Some(serde_json::json!({
                    "session_key": "telegram:404",
                    "prompt": "hello"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_session_lookup_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(&dir));
        let response = app
            .oneshot(authed("GET", "/v1/sessions/telegram:404", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn resolving_unknown_permission_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(&dir));
        let response = app
            .oneshot(authed(
                "POST",
                "/v1/permissions/deadbeef/resolve",
                Some(serde_json::json!({ "allowed": true })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pending_permission_resolves_through_api() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let broker = state.broker.clone();
        let (id, rx) = broker.begin("WebFetch", "telegram:1");

        let app = router(state);
        let response = app
            .oneshot(authed(
                "POST",
                &format!("/v1/permissions/{id}/resolve"),
                Some(serde_json::json!({ "allowed": true, "always": false })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(rx.await, Ok(true));
    }
}
