//! Bearer-token auth for the protected API surface.
//!
//! The configured token is never held in memory as plaintext: the state
//! carries its SHA-256 and incoming tokens are hashed and compared in
//! constant time.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::api_error;
use crate::state::AppState;

/// SHA-256 of a token, for storing at startup.
pub fn token_hash(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_token_hash.as_deref() else {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "api token not configured, protected endpoints are disabled",
        );
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = provided else {
        return api_error(StatusCode::UNAUTHORIZED, "missing bearer token");
    };

    let digest = Sha256::digest(token.as_bytes());
    if bool::from(digest.as_slice().ct_eq(expected)) {
        next.run(request).await
    } else {
        api_error(StatusCode::UNAUTHORIZED, "invalid bearer token")
    }
}
