//! Identity, RBAC and request authorization for the attendance platform.
//!
//! The crate owns the user/role/permission model, the versioned permission
//! resolver, city/zone scope derivation, and the middleware chain protected
//! routes are wrapped in.

pub mod bootstrap;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod resolver;
pub mod scope;
pub mod service;

pub use bootstrap::bootstrap_rbac;
pub use middleware::{attach_city_scope, authenticate, authorize, require_city_scope, AuthState};
pub use repository::AuthRepository;
pub use resolver::{PermissionResolver, ResolvedAccess};
pub use scope::AccessService;
pub use service::AuthService;
