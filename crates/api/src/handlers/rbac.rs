//! Role, permission and user-access management. Admins pass implicitly;
//! everyone else needs `permissions:manage`.

use crate::error::ApiResult;
use crate::state::AppState;
use attend_auth::dto::{
    CreatePermissionRequest, CreateRoleRequest, CreateUserRequest, UpdateRoleRequest,
    UpdateUserAccessRequest,
};
use attend_auth::{authenticate, authorize, AuthState};
use attend_core::AuthUser;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json,
    routing::{delete, get, post, put, Router},
};
use serde_json::{json, Value};

pub fn rbac_routes(auth: &AuthState) -> Router<AppState> {
    Router::new()
        .route("/permissions", get(list_permissions))
        .route("/permissions", post(create_permission))
        .route("/permissions/:id", delete(delete_permission))
        .route("/roles", get(list_roles))
        .route("/roles", post(create_role))
        .route("/roles/:id", put(update_role))
        .route("/roles/:id", delete(delete_role))
        .route("/roles/:id/permissions", get(role_permissions))
        .route("/users", get(list_users))
        .route("/users", post(create_user))
        .route("/users/:id", delete(delete_user))
        .route("/users/:id/access", put(update_user_access))
        .layer(from_fn_with_state(
            auth.clone(),
            authorize("permissions", "manage"),
        ))
        .layer(from_fn_with_state(auth.clone(), authenticate))
}

async fn list_permissions(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let permissions = state.auth_service.list_permissions().await?;
    Ok(Json(json!({ "permissions": permissions })))
}

async fn create_permission(
    State(state): State<AppState>,
    Json(payload): Json<CreatePermissionRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let permission = state.auth_service.create_permission(&payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "permission": permission }))))
}

async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Value>> {
    state.auth_service.delete_permission(id).await?;
    Ok(Json(json!({ "message": "Permission deleted" })))
}

async fn list_roles(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let roles = state.auth_service.list_roles().await?;
    Ok(Json(json!({ "roles": roles })))
}

async fn create_role(
    State(state): State<AppState>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let role = state.auth_service.create_role(&payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "role": role }))))
}

async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<Json<Value>> {
    let role = state.auth_service.update_role(id, &payload).await?;
    Ok(Json(json!({ "role": role })))
}

async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Value>> {
    state.auth_service.delete_role(id).await?;
    Ok(Json(json!({ "message": "Role deleted" })))
}

async fn role_permissions(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Value>> {
    let permissions = state.auth_service.role_permissions(id).await?;
    Ok(Json(json!({ "permissions": permissions })))
}

async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let users = state.auth_service.list_users().await?;
    Ok(Json(json!({ "users": users })))
}

async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user = state.auth_service.create_user(&payload).await?;
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.auth_service.delete_user(id).await?;
    Ok(Json(json!({ "message": "User deleted" })))
}

async fn update_user_access(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    actor: AuthUser,
    Json(payload): Json<UpdateUserAccessRequest>,
) -> ApiResult<Json<Value>> {
    state
        .auth_service
        .update_user_access(id, &payload, Some(actor.user_id))
        .await?;
    Ok(Json(json!({ "message": "Access updated" })))
}
