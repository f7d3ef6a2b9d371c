use crate::dto::{
    CreatePermissionRequest, CreateRoleRequest, CreateUserRequest, LoginRequest, LoginResponse,
    SupervisorLoginRequest, UpdateRoleRequest, UpdateUserAccessRequest, UserProfile,
};
use crate::models::{Permission, Role, User};
use crate::repository::AuthRepository;
use crate::resolver::PermissionResolver;
use crate::scope::AccessService;
use attend_core::{security, Error, JwtService, Result};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

/// Authentication and RBAC management. Every mutation that can change a
/// user's effective permissions bumps the resolver version so cached
/// lookups become unreachable.
#[derive(Clone)]
pub struct AuthService {
    repo: AuthRepository,
    jwt: Arc<JwtService>,
    access: AccessService,
}

impl AuthService {
    pub fn new(repo: AuthRepository, jwt: Arc<JwtService>) -> Self {
        let resolver = Arc::new(PermissionResolver::new(repo.clone()));
        let access = AccessService::new(repo.clone(), resolver);
        Self { repo, jwt, access }
    }

    pub fn access(&self) -> &AccessService {
        &self.access
    }

    pub fn repo(&self) -> &AuthRepository {
        &self.repo
    }

    pub fn jwt(&self) -> &Arc<JwtService> {
        &self.jwt
    }

    fn resolver(&self) -> &Arc<PermissionResolver> {
        self.access.resolver()
    }

    // ---- sessions ----

    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        let user = self
            .repo
            .get_user_by_email(&request.email)
            .await?
            .ok_or_else(|| Error::unauthenticated("Invalid credentials"))?;

        self.check_password(&user, &request.password)?;
        self.issue_session(user).await
    }

    /// Supervisors may sign in by employee code or email.
    pub async fn supervisor_login(&self, request: &SupervisorLoginRequest) -> Result<LoginResponse> {
        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        let user = self
            .repo
            .get_user_by_identifier(&request.identifier)
            .await?
            .ok_or_else(|| Error::unauthenticated("Invalid credentials"))?;

        if user.primary_role != "supervisor" && user.primary_role != "admin" {
            return Err(Error::forbidden("Not a supervisor account"));
        }

        self.check_password(&user, &request.password)?;
        self.issue_session(user).await
    }

    fn check_password(&self, user: &User, password: &str) -> Result<()> {
        let hash = user
            .password_hash
            .as_deref()
            .ok_or_else(|| Error::unauthenticated("Invalid credentials"))?;
        if !security::verify_password(password, hash) {
            return Err(Error::unauthenticated("Invalid credentials"));
        }
        Ok(())
    }

    async fn issue_session(&self, user: User) -> Result<LoginResponse> {
        let token = self.jwt.sign(user.id, &user.primary_role)?;
        let profile = self.build_profile(user).await?;
        Ok(LoginResponse {
            token,
            user: profile,
        })
    }

    pub async fn profile(&self, user_id: i64) -> Result<UserProfile> {
        let user = self
            .repo
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| Error::not_found("User not found"))?;
        self.build_profile(user).await
    }

    async fn build_profile(&self, user: User) -> Result<UserProfile> {
        let roles = self.repo.user_role_names(user.id).await?;
        let resolved = self.resolver().resolve(user.id).await?;
        let mut permissions: Vec<String> = resolved.permissions.iter().cloned().collect();
        permissions.sort();
        let city_scope = self.access.city_scope(user.id, &user.primary_role).await?;

        Ok(UserProfile {
            id: user.id,
            name: user.name,
            emp_code: user.emp_code,
            email: user.email,
            phone: user.phone,
            primary_role: user.primary_role,
            department: user.department,
            roles,
            permissions,
            city_scope,
        })
    }

    // ---- RBAC management ----

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        self.repo.list_roles().await
    }

    pub async fn create_role(&self, request: &CreateRoleRequest) -> Result<Role> {
        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        let role = self
            .repo
            .create_role(&request.name, request.description.as_deref())
            .await?;
        if !request.permission_ids.is_empty() {
            self.repo
                .set_role_permissions(role.id, &request.permission_ids)
                .await?;
        }

        self.resolver().bump_version();
        info!("Role {} created", role.name);
        Ok(role)
    }

    pub async fn update_role(&self, id: i32, request: &UpdateRoleRequest) -> Result<Role> {
        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        let role = self
            .repo
            .update_role(id, request.name.as_deref(), request.description.as_deref())
            .await?;
        if let Some(permission_ids) = &request.permission_ids {
            self.repo.set_role_permissions(id, permission_ids).await?;
        }

        self.resolver().bump_version();
        Ok(role)
    }

    pub async fn delete_role(&self, id: i32) -> Result<()> {
        self.repo.delete_role(id).await?;
        self.resolver().bump_version();
        Ok(())
    }

    pub async fn role_permissions(&self, role_id: i32) -> Result<Vec<Permission>> {
        self.repo.role_permissions(role_id).await
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        self.repo.list_permissions().await
    }

    pub async fn create_permission(&self, request: &CreatePermissionRequest) -> Result<Permission> {
        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        let permission = self
            .repo
            .create_permission(
                &request.module,
                &request.action,
                request.label.as_deref(),
                request.description.as_deref(),
            )
            .await?;

        self.resolver().bump_version();
        Ok(permission)
    }

    pub async fn delete_permission(&self, id: i32) -> Result<()> {
        self.repo.delete_permission(id).await?;
        self.resolver().bump_version();
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.repo.list_users().await
    }

    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<User> {
        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        let password_hash = match &request.password {
            Some(password) => Some(security::hash_password(password)?),
            None => None,
        };

        self.repo
            .create_user(
                &request.name,
                request.emp_code.as_deref(),
                request.email.as_deref(),
                request.phone.as_deref(),
                &request.primary_role,
                request.department.as_deref(),
                password_hash.as_deref(),
            )
            .await
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        self.repo.delete_user(id).await?;
        self.resolver().bump_version();
        Ok(())
    }

    pub async fn update_user_access(
        &self,
        user_id: i64,
        request: &UpdateUserAccessRequest,
        assigned_by: Option<i64>,
    ) -> Result<()> {
        self.repo
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| Error::not_found("User not found"))?;

        self.repo
            .update_user_access(user_id, request, assigned_by)
            .await?;
        self.resolver().bump_version();
        info!("Access updated for user {}", user_id);
        Ok(())
    }
}
