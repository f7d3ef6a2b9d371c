//! Derivation of a user's city and zone visibility.

use crate::repository::AuthRepository;
use crate::resolver::PermissionResolver;
use attend_core::{CityScope, Result};
use std::sync::Arc;

/// Combines the permission resolver with the access-grant tables to answer
/// "which cities/zones may this user see".
#[derive(Clone)]
pub struct AccessService {
    repo: AuthRepository,
    resolver: Arc<PermissionResolver>,
}

impl AccessService {
    pub fn new(repo: AuthRepository, resolver: Arc<PermissionResolver>) -> Self {
        Self { repo, resolver }
    }

    pub fn resolver(&self) -> &Arc<PermissionResolver> {
        &self.resolver
    }

    pub fn repo(&self) -> &AuthRepository {
        &self.repo
    }

    /// City scope for a principal. Admins see everything; an unqualified
    /// `city:view` grant widens to everything; otherwise the union of
    /// explicit city-access rows and city-qualified `city:view` grants.
    pub async fn city_scope(&self, user_id: i64, role: &str) -> Result<CityScope> {
        if role == "admin" {
            return Ok(CityScope::all_cities());
        }

        let resolved = self.resolver.resolve(user_id).await?;
        if let Some(scope) = resolved.scope_for("city", "view") {
            if scope.all {
                return Ok(CityScope::all_cities());
            }
        }

        let mut cities: Vec<i32> = self.repo.city_access_ids(user_id).await?;
        if let Some(scope) = resolved.scope_for("city", "view") {
            cities.extend(scope.cities.iter().copied());
        }

        Ok(CityScope::of(cities))
    }

    /// Zone scope, from explicit zone-access rows. Admins see everything.
    pub async fn zone_scope(&self, user_id: i64, role: &str) -> Result<CityScope> {
        if role == "admin" {
            return Ok(CityScope::all_cities());
        }

        let zones = self.repo.zone_access_ids(user_id).await?;
        Ok(CityScope::of(zones))
    }
}
