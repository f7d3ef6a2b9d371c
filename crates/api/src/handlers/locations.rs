//! Location hierarchy listings, narrowed by the caller's city scope and the
//! matched permission's own scope.

use crate::error::ApiResult;
use crate::state::AppState;
use attend_auth::{attach_city_scope, authenticate, authorize, require_city_scope, AuthState};
use attend_core::{CityScope, PermissionScopes};
use axum::{
    extract::{Query, State},
    middleware::{from_fn, from_fn_with_state},
    response::Json,
    routing::{get, Router},
};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn location_routes(auth: &AuthState) -> Router<AppState> {
    Router::new()
        .merge(scoped(auth, "city", "view", Router::new().route("/cities", get(list_cities))))
        .merge(scoped(auth, "zone", "view", Router::new().route("/zones", get(list_zones))))
        .merge(scoped(auth, "ward", "view", Router::new().route("/wards", get(list_wards))))
        .merge(scoped(
            auth,
            "department",
            "view",
            Router::new().route("/departments", get(list_departments)),
        ))
        .merge(scoped(
            auth,
            "designation",
            "view",
            Router::new().route("/designations", get(list_designations)),
        ))
}

/// Wraps a route group in the full chain: authenticate → attach scope →
/// require scope → authorize. Layers run outermost-last-added, so the order
/// of `.layer` calls here is the reverse of the execution order.
fn scoped(
    auth: &AuthState,
    module: &'static str,
    action: &'static str,
    router: Router<AppState>,
) -> Router<AppState> {
    router
        .layer(from_fn_with_state(auth.clone(), authorize(module, action)))
        .layer(from_fn(require_city_scope))
        .layer(from_fn_with_state(auth.clone(), attach_city_scope))
        .layer(from_fn_with_state(auth.clone(), authenticate))
}

/// A caller sees a row when both their city scope and the matched
/// permission's qualifier allow it.
fn effective_scope(scope: &CityScope, scopes: &PermissionScopes, module: &str, action: &str) -> CityScope {
    match scopes.get(module, action) {
        Some(permission_scope) => scope.intersect(permission_scope),
        None => scope.clone(),
    }
}

#[derive(Debug, Deserialize)]
struct ZoneQuery {
    city_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct WardQuery {
    zone_id: Option<i32>,
}

async fn list_cities(
    State(state): State<AppState>,
    scope: CityScope,
    scopes: PermissionScopes,
) -> ApiResult<Json<Value>> {
    let effective = effective_scope(&scope, &scopes, "city", "view");
    let cities = state.locations.list_cities(&effective).await?;
    Ok(Json(json!({ "count": cities.len(), "cities": cities })))
}

async fn list_zones(
    State(state): State<AppState>,
    scope: CityScope,
    scopes: PermissionScopes,
    Query(query): Query<ZoneQuery>,
) -> ApiResult<Json<Value>> {
    let effective = effective_scope(&scope, &scopes, "zone", "view");
    let zones = state.locations.list_zones(&effective, query.city_id).await?;
    Ok(Json(json!({ "count": zones.len(), "zones": zones })))
}

async fn list_wards(
    State(state): State<AppState>,
    scope: CityScope,
    scopes: PermissionScopes,
    Query(query): Query<WardQuery>,
) -> ApiResult<Json<Value>> {
    let effective = effective_scope(&scope, &scopes, "ward", "view");
    let wards = state.locations.list_wards(&effective, query.zone_id).await?;
    Ok(Json(json!({ "count": wards.len(), "wards": wards })))
}

async fn list_departments(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let departments = state.locations.list_departments().await?;
    Ok(Json(json!({ "departments": departments })))
}

async fn list_designations(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let designations = state.locations.list_designations().await?;
    Ok(Json(json!({ "designations": designations })))
}
