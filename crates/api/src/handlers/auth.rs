//! Session endpoints: login, supervisor login, profile, logout.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use attend_auth::dto::{LoginRequest, SupervisorLoginRequest};
use attend_auth::{authenticate, AuthState};
use attend_core::AuthUser;
use axum::{
    extract::State,
    middleware::from_fn_with_state,
    response::Json,
    routing::{get, post, Router},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::{json, Value};

pub fn auth_routes(auth: &AuthState) -> Router<AppState> {
    let public = Router::new()
        .route("/login", post(login))
        .route("/supervisor-login", post(supervisor_login));

    let protected = Router::new()
        .route("/me", get(me))
        .route("/logout", post(logout))
        .layer(from_fn_with_state(auth.clone(), authenticate));

    public.merge(protected)
}

// The token itself carries the 24 h expiry; the cookie just transports it.
fn session_cookie(token: &str) -> Cookie<'static> {
    Cookie::build(("token", token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .build()
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<Value>)> {
    let response = state.auth_service.login(&payload).await.map_err(ApiError)?;
    let jar = jar.add(session_cookie(&response.token));
    Ok((jar, Json(json!({ "token": response.token, "user": response.user }))))
}

async fn supervisor_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<SupervisorLoginRequest>,
) -> ApiResult<(CookieJar, Json<Value>)> {
    let response = state
        .auth_service
        .supervisor_login(&payload)
        .await
        .map_err(ApiError)?;
    let jar = jar.add(session_cookie(&response.token));
    Ok((jar, Json(json!({ "token": response.token, "user": response.user }))))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Value>> {
    let profile = state.auth_service.profile(user.user_id).await?;
    Ok(Json(json!({ "user": profile })))
}

async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    let jar = jar.remove(Cookie::build(("token", "")).path("/").build());
    (jar, Json(json!({ "message": "Logged out" })))
}
