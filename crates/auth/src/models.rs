use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub emp_code: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub primary_role: String,
    pub department: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.primary_role == "admin"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: i32,
    pub module: String,
    pub action: String,
    pub label: Option<String>,
    pub description: Option<String>,
}

impl Permission {
    /// Canonical `"module:action"` key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.module, self.action)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.module, self.action)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRole {
    pub user_id: i64,
    pub role_id: i32,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: Option<i64>,
}

/// Direct user grant, optionally qualified by a city. A NULL city means the
/// grant covers all cities for that permission.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserPermission {
    pub user_id: i64,
    pub permission_id: i32,
    pub city_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserCityAccess {
    pub user_id: i64,
    pub city_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserZoneAccess {
    pub user_id: i64,
    pub zone_id: i32,
}

/// One row of the permission-grant union the resolver folds over: role-derived
/// rows carry a NULL city, direct grants carry their optional qualifier.
#[derive(Debug, Clone, FromRow)]
pub struct PermissionGrantRow {
    pub module: String,
    pub action: String,
    pub city_id: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_key_format() {
        let p = Permission {
            id: 1,
            module: "attendance".to_string(),
            action: "view".to_string(),
            label: None,
            description: None,
        };
        assert_eq!(p.key(), "attendance:view");
        assert_eq!(p.to_string(), "attendance:view");
    }
}
