use crate::dto::{PermissionGrant, UpdateUserAccessRequest};
use crate::models::{Permission, PermissionGrantRow, Role, User};
use attend_core::{DatabasePool, Error, Result};
use chrono::Utc;

#[derive(Clone)]
pub struct AuthRepository {
    db: DatabasePool,
}

impl AuthRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabasePool {
        &self.db
    }

    // ---- users ----

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE emp_code = $1 OR LOWER(email) = LOWER($1)",
        )
        .bind(identifier)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(user)
    }

    /// Cheap existence probe used when stamping audit actors.
    pub async fn user_exists(&self, id: i64) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(found.is_some())
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY name")
            .fetch_all(self.db.pool())
            .await?;

        Ok(users)
    }

    pub async fn create_user(
        &self,
        name: &str,
        emp_code: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
        primary_role: &str,
        department: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (name, emp_code, email, phone, primary_role, department, password_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(name)
        .bind(emp_code)
        .bind(email)
        .bind(phone)
        .bind(primary_role)
        .bind(department)
        .bind(password_hash)
        .fetch_one(self.db.pool())
        .await?;

        Ok(user)
    }

    /// Dropping a user cascades to user_roles, user_permissions,
    /// user_city_access and user_zone_access at the schema level.
    pub async fn delete_user(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("User not found"));
        }
        Ok(())
    }

    // ---- roles ----

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY name")
            .fetch_all(self.db.pool())
            .await?;

        Ok(roles)
    }

    pub async fn get_role(&self, id: i32) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(role)
    }

    /// Role names are case-normalised; duplicates surface as `Conflict`.
    pub async fn create_role(&self, name: &str, description: Option<&str>) -> Result<Role> {
        let role = sqlx::query_as::<_, Role>(
            "INSERT INTO roles (name, description, is_system) VALUES (LOWER($1), $2, FALSE) RETURNING *",
        )
        .bind(name)
        .bind(description)
        .fetch_one(self.db.pool())
        .await?;

        Ok(role)
    }

    pub async fn update_role(
        &self,
        id: i32,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Role> {
        let existing = self
            .get_role(id)
            .await?
            .ok_or_else(|| Error::not_found("Role not found"))?;
        if existing.is_system {
            return Err(Error::forbidden("System roles cannot be edited"));
        }

        let role = sqlx::query_as::<_, Role>(
            "UPDATE roles SET name = COALESCE(LOWER($2), name), description = COALESCE($3, description)
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_one(self.db.pool())
        .await?;

        Ok(role)
    }

    /// Cascades to role_permissions and user_roles at the schema level.
    pub async fn delete_role(&self, id: i32) -> Result<()> {
        let existing = self
            .get_role(id)
            .await?
            .ok_or_else(|| Error::not_found("Role not found"))?;
        if existing.is_system {
            return Err(Error::forbidden("System roles cannot be deleted"));
        }

        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    pub async fn set_role_permissions(&self, role_id: i32, permission_ids: &[i32]) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        for permission_id in permission_ids {
            sqlx::query(
                "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(role_id)
            .bind(permission_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn role_permissions(&self, role_id: i32) -> Result<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(
            "SELECT p.* FROM permissions p
             INNER JOIN role_permissions rp ON p.id = rp.permission_id
             WHERE rp.role_id = $1
             ORDER BY p.module, p.action",
        )
        .bind(role_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(permissions)
    }

    // ---- permissions ----

    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let permissions =
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY module, action")
                .fetch_all(self.db.pool())
                .await?;

        Ok(permissions)
    }

    pub async fn create_permission(
        &self,
        module: &str,
        action: &str,
        label: Option<&str>,
        description: Option<&str>,
    ) -> Result<Permission> {
        let permission = sqlx::query_as::<_, Permission>(
            "INSERT INTO permissions (module, action, label, description)
             VALUES (LOWER($1), LOWER($2), $3, $4) RETURNING *",
        )
        .bind(module)
        .bind(action)
        .bind(label)
        .bind(description)
        .fetch_one(self.db.pool())
        .await?;

        Ok(permission)
    }

    pub async fn delete_permission(&self, id: i32) -> Result<()> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Permission not found"));
        }
        Ok(())
    }

    // ---- access resolution inputs ----

    /// The union the permission resolver folds over: role-derived rows
    /// contribute a NULL city (meaning all), direct grants carry their
    /// optional city qualifier.
    pub async fn permission_grants_for_user(&self, user_id: i64) -> Result<Vec<PermissionGrantRow>> {
        let rows = sqlx::query_as::<_, PermissionGrantRow>(
            "SELECT p.module, p.action, NULL::INT AS city_id
             FROM permissions p
             INNER JOIN role_permissions rp ON p.id = rp.permission_id
             INNER JOIN user_roles ur ON rp.role_id = ur.role_id
             WHERE ur.user_id = $1
             UNION ALL
             SELECT p.module, p.action, up.city_id
             FROM permissions p
             INNER JOIN user_permissions up ON p.id = up.permission_id
             WHERE up.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }

    pub async fn city_access_ids(&self, user_id: i64) -> Result<Vec<i32>> {
        let rows: Vec<(i32,)> =
            sqlx::query_as("SELECT city_id FROM user_city_access WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(self.db.pool())
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn zone_access_ids(&self, user_id: i64) -> Result<Vec<i32>> {
        let rows: Vec<(i32,)> =
            sqlx::query_as("SELECT zone_id FROM user_zone_access WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(self.db.pool())
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn user_role_names(&self, user_id: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT r.name FROM roles r
             INNER JOIN user_roles ur ON r.id = ur.role_id
             WHERE ur.user_id = $1
             ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    // ---- transactional access update ----

    /// Replaces the provided facets of a user's access in one transaction.
    /// Facets left as `None` are untouched.
    pub async fn update_user_access(
        &self,
        user_id: i64,
        update: &UpdateUserAccessRequest,
        assigned_by: Option<i64>,
    ) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        if let Some(role_ids) = &update.role_ids {
            sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            for role_id in role_ids {
                sqlx::query(
                    "INSERT INTO user_roles (user_id, role_id, assigned_at, assigned_by)
                     VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
                )
                .bind(user_id)
                .bind(role_id)
                .bind(Utc::now())
                .bind(assigned_by)
                .execute(&mut *tx)
                .await?;
            }
        }

        if let Some(grants) = &update.permissions {
            sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            for PermissionGrant {
                permission_id,
                city_id,
            } in grants
            {
                sqlx::query(
                    "INSERT INTO user_permissions (user_id, permission_id, city_id)
                     VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
                )
                .bind(user_id)
                .bind(permission_id)
                .bind(city_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        if let Some(city_ids) = &update.city_ids {
            sqlx::query("DELETE FROM user_city_access WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            for city_id in city_ids {
                sqlx::query(
                    "INSERT INTO user_city_access (user_id, city_id) VALUES ($1, $2)
                     ON CONFLICT DO NOTHING",
                )
                .bind(user_id)
                .bind(city_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        if let Some(zone_ids) = &update.zone_ids {
            sqlx::query("DELETE FROM user_zone_access WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            for zone_id in zone_ids {
                sqlx::query(
                    "INSERT INTO user_zone_access (user_id, zone_id) VALUES ($1, $2)
                     ON CONFLICT DO NOTHING",
                )
                .bind(user_id)
                .bind(zone_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
