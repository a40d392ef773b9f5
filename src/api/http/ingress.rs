// src/api/http/ingress.rs
// The one business endpoint: `POST /process_request`, gated by bearer-token
// admission. Grounded in the teacher's `api/http/auth.rs` router-construction
// shape, with the login/register handlers replaced by the single ingress
// dispatch.

use axum::{extract::State, middleware, routing::post, Json, Router};
use std::sync::Arc;

use crate::auth::require_bearer_token;
use crate::ingress::{IncomingFromMsRequest, IngressError, IngressResponse};
use crate::state::AppState;

pub fn create_ingress_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/process_request", post(process_request))
        .route_layer(middleware::from_fn_with_state(state, require_bearer_token))
}

async fn process_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IncomingFromMsRequest>,
) -> Result<IngressResponse, IngressError> {
    state.ingress.dispatch(req).await
}
