//! Forwarding of report payloads to the external messaging gateway.

use crate::error::ApiResult;
use crate::state::AppState;
use attend_auth::{authenticate, AuthState};
use axum::{
    extract::State,
    middleware::from_fn_with_state,
    response::Json,
    routing::{post, Router},
};
use serde_json::{json, Value};

pub fn whatsapp_routes(auth: &AuthState) -> Router<AppState> {
    Router::new()
        .route("/report", post(forward_report))
        .layer(from_fn_with_state(auth.clone(), authenticate))
}

async fn forward_report(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let gateway_response = state.messaging.send_report(&body).await?;
    Ok(Json(json!({
        "message": "Report forwarded",
        "gateway_response": gateway_response,
    })))
}
