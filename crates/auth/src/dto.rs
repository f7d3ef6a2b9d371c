use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SupervisorLoginRequest {
    /// Employee code or email, whichever the supervisor signed up with.
    #[validate(length(min = 1))]
    pub identifier: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

/// The authenticated user plus their resolved access profile.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub emp_code: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub primary_role: String,
    pub department: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub city_scope: attend_core::CityScope,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 2, max = 64))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 2, max = 64))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub permission_ids: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePermissionRequest {
    #[validate(length(min = 2, max = 64))]
    pub module: String,
    #[validate(length(min = 2, max = 64))]
    pub action: String,
    pub label: Option<String>,
    pub description: Option<String>,
}

/// A direct permission grant in an access-update request. `city_id = None`
/// grants the permission for all cities.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PermissionGrant {
    pub permission_id: i32,
    pub city_id: Option<i32>,
}

/// Full replacement of a user's role/permission/city/zone assignments.
/// Applied in a single transaction.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateUserAccessRequest {
    pub role_ids: Option<Vec<i32>>,
    pub permissions: Option<Vec<PermissionGrant>>,
    pub city_ids: Option<Vec<i32>>,
    pub zone_ids: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub emp_code: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub primary_role: String,
    pub department: Option<String>,
    #[validate(length(min = 8))]
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_requires_valid_email() {
        let ok = LoginRequest {
            email: "user@example.com".to_string(),
            password: "pw".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad = LoginRequest {
            email: "not-an-email".to_string(),
            password: "pw".to_string(),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn create_user_request_validates_password_length() {
        let short = CreateUserRequest {
            name: "A".to_string(),
            emp_code: None,
            email: None,
            phone: None,
            primary_role: "user".to_string(),
            department: None,
            password: Some("short".to_string()),
        };
        assert!(short.validate().is_err());
    }
}
