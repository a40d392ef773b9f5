// src/api/http/health.rs
// Liveness probe. Ambient stack, not named by the distilled spec but present
// in essentially every teacher-style service (§4.H).

use axum::{http::StatusCode, response::IntoResponse, Json};

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
