use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// Axum integration for the request-scoped context values
#[cfg(feature = "axum")]
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::Json,
};

/// Authenticated principal attached to the request by the authentication
/// middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: i64,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// City (or zone) visibility: either everything, or an explicit id set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CityScope {
    pub all: bool,
    pub cities: HashSet<i32>,
}

impl CityScope {
    pub fn all_cities() -> Self {
        Self {
            all: true,
            cities: HashSet::new(),
        }
    }

    pub fn of(cities: impl IntoIterator<Item = i32>) -> Self {
        Self {
            all: false,
            cities: cities.into_iter().collect(),
        }
    }

    pub fn allows(&self, city_id: i32) -> bool {
        self.all || self.cities.contains(&city_id)
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.cities.is_empty()
    }

    /// Sorted id list, the shape SQL `ANY($n)` binds want.
    pub fn ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.cities.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The scope visible through both `self` and `other`.
    pub fn intersect(&self, other: &CityScope) -> CityScope {
        match (self.all, other.all) {
            (true, true) => CityScope::all_cities(),
            (true, false) => other.clone(),
            (false, true) => self.clone(),
            (false, false) => CityScope {
                all: false,
                cities: self.cities.intersection(&other.cities).copied().collect(),
            },
        }
    }
}

/// Per-request bag mapping `"module:action"` to the city scope the matched
/// permission grants. Populated by the authorize middleware, read by handlers
/// that narrow their queries.
#[derive(Debug, Clone, Default)]
pub struct PermissionScopes(pub HashMap<String, CityScope>);

impl PermissionScopes {
    pub fn get(&self, module: &str, action: &str) -> Option<&CityScope> {
        self.0.get(&format!("{}:{}", module, action))
    }

    pub fn insert(&mut self, module: &str, action: &str, scope: CityScope) {
        self.0.insert(format!("{}:{}", module, action), scope);
    }
}

#[cfg(feature = "axum")]
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Authentication required" })),
            )
        })
    }
}

#[cfg(feature = "axum")]
#[async_trait]
impl<S> FromRequestParts<S> for CityScope
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CityScope>().cloned().ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "City scope not attached" })),
            )
        })
    }
}

#[cfg(feature = "axum")]
#[async_trait]
impl<S> FromRequestParts<S> for PermissionScopes
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<PermissionScopes>()
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_all_allows_everything() {
        let scope = CityScope::all_cities();
        assert!(scope.allows(1));
        assert!(scope.allows(9999));
        assert!(!scope.is_empty());
    }

    #[test]
    fn explicit_scope_allows_members_only() {
        let scope = CityScope::of([2, 5]);
        assert!(scope.allows(2));
        assert!(scope.allows(5));
        assert!(!scope.allows(3));
    }

    #[test]
    fn empty_scope_is_empty() {
        let scope = CityScope::of([]);
        assert!(scope.is_empty());
        assert!(!scope.allows(1));
    }

    #[test]
    fn ids_are_sorted() {
        let scope = CityScope::of([9, 1, 5]);
        assert_eq!(scope.ids(), vec![1, 5, 9]);
    }

    #[test]
    fn intersect_narrows_correctly() {
        let all = CityScope::all_cities();
        let some = CityScope::of([2, 5, 9]);
        let other = CityScope::of([5, 9, 11]);

        assert!(all.intersect(&all).all);
        assert_eq!(all.intersect(&some), some);
        assert_eq!(some.intersect(&all), some);
        assert_eq!(some.intersect(&other).ids(), vec![5, 9]);
        assert!(some.intersect(&CityScope::of([])).is_empty());
    }

    #[test]
    fn permission_scopes_keyed_by_module_action() {
        let mut scopes = PermissionScopes::default();
        scopes.insert("attendance", "view", CityScope::of([7]));
        assert!(scopes.get("attendance", "view").unwrap().allows(7));
        assert!(scopes.get("attendance", "edit").is_none());
    }
}
