//! Shared infrastructure for the attendance platform: configuration, the
//! error framework, the database pool, token signing, and the request-scoped
//! authorization context types.

pub mod config;
pub mod database;
pub mod error;
pub mod security;
pub mod types;

pub use config::Config;
pub use database::DatabasePool;
pub use error::{Error, ErrorKind, Result};
pub use security::{Claims, JwtService};
pub use types::{AuthUser, CityScope, PermissionScopes};
