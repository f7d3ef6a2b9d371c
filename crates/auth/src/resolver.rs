//! Permission resolution with a short-lived, version-keyed memo.
//!
//! A user's effective permissions are the union of their roles' permissions
//! (which always cover all cities) and their direct grants (optionally
//! city-qualified). For a given `module:action` key a single NULL-city grant
//! collapses that key's scope to all cities.
//!
//! Results are memoised per `(user_id, version)`. Every RBAC write bumps the
//! version counter, making all older entries unreachable; they are swept out
//! opportunistically on subsequent inserts. The counter is process-local:
//! in a multi-replica deployment each replica converges independently.

use crate::models::PermissionGrantRow;
use crate::repository::AuthRepository;
use attend_core::{CityScope, Result};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A user's resolved access: the flat permission set and the per-permission
/// city scope map.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAccess {
    pub permissions: HashSet<String>,
    pub city_scopes: HashMap<String, CityScope>,
}

impl ResolvedAccess {
    pub fn has(&self, module: &str, action: &str) -> bool {
        self.permissions.contains(&format!("{}:{}", module, action))
    }

    pub fn scope_for(&self, module: &str, action: &str) -> Option<&CityScope> {
        self.city_scopes.get(&format!("{}:{}", module, action))
    }
}

/// Folds grant rows into a [`ResolvedAccess`]. Pure; exercised directly by
/// the unit tests.
pub fn merge_grants(rows: &[PermissionGrantRow]) -> ResolvedAccess {
    let mut access = ResolvedAccess::default();

    for row in rows {
        let key = format!("{}:{}", row.module, row.action);
        access.permissions.insert(key.clone());

        let scope = access.city_scopes.entry(key).or_default();
        match row.city_id {
            None => {
                // One unqualified grant widens this permission to all cities.
                scope.all = true;
                scope.cities.clear();
            }
            Some(city_id) if !scope.all => {
                scope.cities.insert(city_id);
            }
            Some(_) => {}
        }
    }

    access
}

pub struct PermissionResolver {
    repo: AuthRepository,
    version: AtomicU64,
    cache: DashMap<(i64, u64), Arc<ResolvedAccess>>,
}

impl PermissionResolver {
    pub fn new(repo: AuthRepository) -> Self {
        Self {
            repo,
            version: AtomicU64::new(0),
            cache: DashMap::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Called by every write that touches roles, permissions,
    /// role_permissions, user_roles or user_permissions.
    pub fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub async fn resolve(&self, user_id: i64) -> Result<Arc<ResolvedAccess>> {
        let version = self.version();
        if let Some(hit) = self.cache.get(&(user_id, version)) {
            return Ok(hit.clone());
        }

        // DB errors propagate without populating the cache.
        let rows = self.repo.permission_grants_for_user(user_id).await?;
        let resolved = Arc::new(merge_grants(&rows));

        self.cache.insert((user_id, version), resolved.clone());
        self.sweep_stale(version);

        Ok(resolved)
    }

    /// Drops entries keyed under superseded versions. Amortised against
    /// growth rather than run on a timer.
    fn sweep_stale(&self, current: u64) {
        if self.cache.len() > 1024 {
            self.cache.retain(|(_, v), _| *v == current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(module: &str, action: &str, city_id: Option<i32>) -> PermissionGrantRow {
        PermissionGrantRow {
            module: module.to_string(),
            action: action.to_string(),
            city_id,
        }
    }

    #[test]
    fn role_grants_cover_all_cities() {
        let access = merge_grants(&[row("city", "view", None)]);
        assert!(access.has("city", "view"));
        let scope = access.scope_for("city", "view").unwrap();
        assert!(scope.all);
        assert!(scope.cities.is_empty());
    }

    #[test]
    fn direct_grants_union_city_ids() {
        let access = merge_grants(&[
            row("attendance", "view", Some(2)),
            row("attendance", "view", Some(5)),
        ]);
        let scope = access.scope_for("attendance", "view").unwrap();
        assert!(!scope.all);
        assert_eq!(scope.ids(), vec![2, 5]);
    }

    #[test]
    fn null_city_collapses_scope_to_all() {
        let access = merge_grants(&[
            row("attendance", "view", Some(2)),
            row("attendance", "view", None),
            row("attendance", "view", Some(9)),
        ]);
        let scope = access.scope_for("attendance", "view").unwrap();
        assert!(scope.all);
        assert!(scope.cities.is_empty());
    }

    #[test]
    fn keys_are_independent() {
        let access = merge_grants(&[
            row("city", "view", None),
            row("attendance", "view", Some(3)),
        ]);
        assert!(access.scope_for("city", "view").unwrap().all);
        assert!(!access.scope_for("attendance", "view").unwrap().all);
        assert!(!access.has("attendance", "manage"));
    }

    #[test]
    fn empty_rows_resolve_to_nothing() {
        let access = merge_grants(&[]);
        assert!(access.permissions.is_empty());
        assert!(access.city_scopes.is_empty());
    }
}
