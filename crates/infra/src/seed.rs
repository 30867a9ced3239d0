//! Development catalog: permissions, roles and an optional admin account.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use gatekeeper_auth::{
    AuthError, AuthService, NewPrincipal, Permission, PermissionDefinition, Role, RoleDefinition,
};

use crate::store::InMemoryCredentialStore;

pub const ADMIN_USERNAME: &str = "admin";

// ─────────────────────────────────────────────────────────────────────────────
// Permission / role catalog
// ─────────────────────────────────────────────────────────────────────────────

pub fn permission_catalog() -> Vec<PermissionDefinition> {
    vec![
        PermissionDefinition::new("user:create", "Create users"),
        PermissionDefinition::new("user:read", "Read users"),
        PermissionDefinition::new("user:update", "Update users"),
        PermissionDefinition::new("user:delete", "Delete users"),
        PermissionDefinition::new("role:manage", "Manage roles and permissions"),
        PermissionDefinition::new("inventory:manage", "Manage inventory"),
        PermissionDefinition::new("sales:manage", "Manage sales"),
        PermissionDefinition::new("reports:view", "View reports"),
        PermissionDefinition::new("prescriptions:manage", "Manage prescriptions")
            .with_description("Attach and review beneficiary prescriptions"),
    ]
}

pub fn role_catalog() -> Vec<RoleDefinition> {
    let all: Vec<Permission> = permission_catalog().into_iter().map(|p| p.code).collect();

    vec![
        RoleDefinition::new("ADMIN", all).with_description("Full access"),
        RoleDefinition::new("PHARMACIST", ["user:read", "inventory:manage", "prescriptions:manage"]),
        RoleDefinition::new("CASHIER", ["user:read", "sales:manage"]),
        RoleDefinition::new("SELLER", ["user:read", "sales:manage"]),
        RoleDefinition::new("INVENTORY_ADMIN", ["inventory:manage", "reports:view"]),
    ]
}

/// Install the role catalog and, when `admin_password` is given, an `admin`
/// principal holding `ADMIN`. Re-running is harmless.
pub async fn seed_dev_catalog(
    store: &InMemoryCredentialStore,
    service: &Arc<AuthService>,
    admin_password: Option<&str>,
) -> anyhow::Result<()> {
    let roles = role_catalog();
    let role_count = roles.len();
    for role in roles {
        store
            .upsert_role(role)
            .context("failed to seed role catalog")?;
    }
    info!(roles = role_count, "seeded role catalog");

    let Some(password) = admin_password else {
        return Ok(());
    };

    let admin = NewPrincipal {
        username: ADMIN_USERNAME.to_string(),
        email: None,
        secret: password.to_string(),
        roles: vec![Role::new("ADMIN")],
        permissions: Vec::new(),
        beneficiary: None,
    };

    match service.register(admin).await {
        Ok(p) => info!(principal_id = %p.id, "seeded admin principal"),
        Err(AuthError::Conflict(_)) => info!("admin principal already present"),
        Err(e) => return Err(anyhow::anyhow!("failed to seed admin principal: {e}")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_holds_every_catalog_permission() {
        let roles = role_catalog();
        let admin = roles.iter().find(|r| r.name.as_str() == "ADMIN").unwrap();
        assert_eq!(admin.permissions.len(), permission_catalog().len());
    }

    #[test]
    fn catalog_codes_carry_module_tags() {
        let modules: Vec<String> = permission_catalog()
            .into_iter()
            .filter_map(|p| p.module)
            .collect();
        assert!(modules.contains(&"user".to_string()));
        assert!(modules.contains(&"prescriptions".to_string()));
    }

    #[test]
    fn role_permissions_come_from_the_catalog() {
        let codes: Vec<Permission> = permission_catalog().into_iter().map(|p| p.code).collect();
        for role in role_catalog() {
            for p in &role.permissions {
                assert!(codes.contains(p), "{} grants unknown {}", role.name, p);
            }
        }
    }
}
