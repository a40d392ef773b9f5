// src/auth/mod.rs
// Bearer-token admission for the ingress endpoint.

use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

/// Constant-time comparison so a timing side-channel can't leak the token
/// byte-by-byte. Short-circuiting `==` on `&str` is not safe here.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub async fn require_bearer_token(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let presented = header.and_then(|h| h.strip_prefix("Bearer "));

    match presented {
        Some(token) if constant_time_eq(token, &state.config.bearer_token) => next.run(request).await,
        _ => (
            StatusCode::FORBIDDEN,
            Json(json!({ "detail": "Invalid bearer token" })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_tokens_match() {
        assert!(constant_time_eq("secret-token", "secret-token"));
    }

    #[test]
    fn different_lengths_do_not_match() {
        assert!(!constant_time_eq("short", "much-longer-token"));
    }

    #[test]
    fn same_length_different_bytes_do_not_match() {
        assert!(!constant_time_eq("secret-token", "secret-tokeX"));
    }
}
