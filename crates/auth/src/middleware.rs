//! Request authorization chain.
//!
//! Ordered pipeline for protected endpoints:
//!
//! 1. [`authenticate`] — extract and verify the bearer token, attach
//!    [`AuthUser`].
//! 2. [`attach_city_scope`] — compute and attach the caller's [`CityScope`].
//! 3. [`require_city_scope`] — reject callers with an empty scope.
//! 4. [`authorize`] — enforce a `(module, action)` requirement and copy that
//!    permission's city scope into the per-request [`PermissionScopes`] bag.
//!
//! `authenticate` must precede all others; the scope middlewares must run
//! before any handler that queries scoped tables.

use crate::scope::AccessService;
use attend_core::{AuthUser, CityScope, JwtService, PermissionScopes};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<JwtService>,
    pub access: AccessService,
}

pub async fn authenticate(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = match extract_token(&request) {
        Some(token) => token,
        None => return Ok(unauthorized_response("No token provided")),
    };

    let claims = match state.jwt.verify(&token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Token verification failed: {}", e);
            return Ok(forbidden_response("Invalid or expired token"));
        }
    };

    request.extensions_mut().insert(AuthUser {
        user_id: claims.user_id,
        role: claims.role,
    });

    Ok(next.run(request).await)
}

pub async fn attach_city_scope(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user = match request.extensions().get::<AuthUser>() {
        Some(user) => user.clone(),
        None => {
            error!("attach_city_scope ran before authenticate");
            return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };

    let scope = match state.access.city_scope(user.user_id, &user.role).await {
        Ok(scope) => scope,
        Err(e) => {
            error!("Failed to resolve city scope for user {}: {}", user.user_id, e);
            return Ok(internal_response("Unable to resolve city scope"));
        }
    };

    request.extensions_mut().insert(scope);
    Ok(next.run(request).await)
}

pub async fn require_city_scope(request: Request, next: Next) -> Result<Response, StatusCode> {
    let scope = match request.extensions().get::<CityScope>() {
        Some(scope) => scope,
        None => {
            error!("require_city_scope ran before attach_city_scope");
            return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };

    if scope.is_empty() {
        return Ok(forbidden_response("No city access assigned"));
    }

    Ok(next.run(request).await)
}

/// Middleware factory enforcing a `(module, action)` permission. Admins
/// bypass the check and receive an all-cities scope for the key.
pub fn authorize(
    module: &'static str,
    action: &'static str,
) -> impl Fn(
    State<AuthState>,
    Request,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, StatusCode>> + Send>>
       + Clone {
    move |State(state): State<AuthState>, request: Request, next: Next| {
        Box::pin(async move { authorize_request(state, module, action, request, next).await })
    }
}

async fn authorize_request(
    state: AuthState,
    module: &'static str,
    action: &'static str,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user = match request.extensions().get::<AuthUser>() {
        Some(user) => user.clone(),
        None => {
            error!("authorize ran before authenticate");
            return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };

    let scope = if user.is_admin() {
        CityScope::all_cities()
    } else {
        let resolved = match state.access.resolver().resolve(user.user_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("Permission resolution failed for user {}: {}", user.user_id, e);
                return Ok(internal_response("Unable to resolve permissions"));
            }
        };

        if !resolved.has(module, action) {
            warn!(
                "User {} lacks required permission {}:{}",
                user.user_id, module, action
            );
            return Ok(forbidden_response(&format!(
                "Missing required permission: {}:{}",
                module, action
            )));
        }

        resolved
            .scope_for(module, action)
            .cloned()
            .unwrap_or_default()
    };

    let mut scopes = request
        .extensions()
        .get::<PermissionScopes>()
        .cloned()
        .unwrap_or_default();
    scopes.insert(module, action, scope);
    request.extensions_mut().insert(scopes);

    Ok(next.run(request).await)
}

// Token sources in precedence order: cookie, Authorization: Bearer,
// x-access-token header, token query parameter. First non-empty wins.
fn extract_token(request: &Request) -> Option<String> {
    let jar = CookieJar::from_headers(request.headers());
    if let Some(cookie) = jar.get("token") {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    if let Some(value) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    if let Some(token) = request
        .headers()
        .get("x-access-token")
        .and_then(|v| v.to_str().ok())
    {
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    request.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == "token" && !value.is_empty()).then(|| value.to_string())
        })
    })
}

// Response helpers

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn forbidden_response(message: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn internal_response(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn request_with(builder: axum::http::request::Builder) -> Request {
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn cookie_wins_over_header() {
        let request = request_with(
            HttpRequest::builder()
                .uri("/api/cities")
                .header("cookie", "token=from-cookie")
                .header(AUTHORIZATION, "Bearer from-header"),
        );
        assert_eq!(extract_token(&request).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn bearer_header_used_when_no_cookie() {
        let request = request_with(
            HttpRequest::builder()
                .uri("/api/cities")
                .header(AUTHORIZATION, "Bearer abc.def.ghi"),
        );
        assert_eq!(extract_token(&request).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn fallback_header_and_query_param() {
        let request = request_with(
            HttpRequest::builder()
                .uri("/api/cities")
                .header("x-access-token", "legacy-token"),
        );
        assert_eq!(extract_token(&request).as_deref(), Some("legacy-token"));

        let request = request_with(HttpRequest::builder().uri("/api/cities?token=query-token&x=1"));
        assert_eq!(extract_token(&request).as_deref(), Some("query-token"));
    }

    #[test]
    fn empty_sources_are_skipped() {
        let request = request_with(
            HttpRequest::builder()
                .uri("/api/cities?token=query-token")
                .header("cookie", "token=")
                .header("x-access-token", ""),
        );
        assert_eq!(extract_token(&request).as_deref(), Some("query-token"));
    }

    #[test]
    fn missing_token_yields_none() {
        let request = request_with(HttpRequest::builder().uri("/api/cities"));
        assert_eq!(extract_token(&request), None);
    }
}
