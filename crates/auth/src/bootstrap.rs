//! Idempotent RBAC seeding, run once per process at startup inside a single
//! transaction. Re-running against an already seeded database is a no-op.

use attend_core::{DatabasePool, Result};
use tracing::info;

/// `(module, action, label)` triples every deployment starts with.
const DEFAULT_PERMISSIONS: &[(&str, &str, &str)] = &[
    ("city", "view", "View cities"),
    ("zone", "view", "View zones"),
    ("ward", "view", "View wards"),
    ("department", "view", "View departments"),
    ("designation", "view", "View designations"),
    ("employee", "view", "View employees"),
    ("employee", "manage", "Manage employees"),
    ("attendance", "view", "View attendance"),
    ("attendance", "manage", "Record attendance"),
    ("attendance", "download", "Download attendance reports"),
    ("reports", "view", "View reports"),
    ("permissions", "manage", "Manage roles and permissions"),
];

/// `(role, description, permissions)` — the permission list is `*` for all.
const DEFAULT_ROLES: &[(&str, &str, &[&str])] = &[
    ("admin", "Full administrative access", &["*"]),
    (
        "supervisor",
        "Field supervision and attendance recording",
        &[
            "city:view",
            "zone:view",
            "ward:view",
            "employee:view",
            "attendance:view",
            "attendance:manage",
        ],
    ),
    (
        "manager",
        "Operational reporting",
        &[
            "city:view",
            "zone:view",
            "ward:view",
            "employee:view",
            "attendance:view",
            "attendance:download",
            "reports:view",
        ],
    ),
    (
        "operator",
        "Attendance data entry",
        &["employee:view", "attendance:view", "attendance:manage"],
    ),
    ("user", "Basic read access", &["attendance:view"]),
];

pub async fn bootstrap_rbac(db: &DatabasePool) -> Result<()> {
    let mut tx = db.pool().begin().await?;

    for (module, action, label) in DEFAULT_PERMISSIONS {
        sqlx::query(
            "INSERT INTO permissions (module, action, label) VALUES ($1, $2, $3)
             ON CONFLICT (module, action) DO NOTHING",
        )
        .bind(module)
        .bind(action)
        .bind(label)
        .execute(&mut *tx)
        .await?;
    }

    for (role, description, permissions) in DEFAULT_ROLES {
        sqlx::query(
            "INSERT INTO roles (name, description, is_system) VALUES ($1, $2, TRUE)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(role)
        .bind(description)
        .execute(&mut *tx)
        .await?;

        if permissions.first() == Some(&"*") {
            sqlx::query(
                "INSERT INTO role_permissions (role_id, permission_id)
                 SELECT r.id, p.id FROM roles r CROSS JOIN permissions p
                 WHERE r.name = $1
                 ON CONFLICT DO NOTHING",
            )
            .bind(role)
            .execute(&mut *tx)
            .await?;
            continue;
        }

        for key in *permissions {
            let Some((module, action)) = key.split_once(':') else {
                continue;
            };
            sqlx::query(
                "INSERT INTO role_permissions (role_id, permission_id)
                 SELECT r.id, p.id FROM roles r, permissions p
                 WHERE r.name = $1 AND p.module = $2 AND p.action = $3
                 ON CONFLICT DO NOTHING",
            )
            .bind(role)
            .bind(module)
            .bind(action)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    info!("RBAC bootstrap complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_permission_keys_are_well_formed() {
        for (module, action, _) in DEFAULT_PERMISSIONS {
            assert!(!module.is_empty() && !action.is_empty());
            assert_eq!(module.to_lowercase(), *module);
            assert_eq!(action.to_lowercase(), *action);
        }
    }

    #[test]
    fn role_permission_lists_reference_seeded_permissions() {
        for (role, _, permissions) in DEFAULT_ROLES {
            for key in *permissions {
                if *key == "*" {
                    continue;
                }
                let (module, action) = key.split_once(':').unwrap();
                assert!(
                    DEFAULT_PERMISSIONS
                        .iter()
                        .any(|(m, a, _)| m == &module && a == &action),
                    "role {} references unseeded permission {}",
                    role,
                    key
                );
            }
        }
    }
}
