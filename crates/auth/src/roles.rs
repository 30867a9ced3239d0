use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use gatekeeper_core::RoleId;

use crate::Permission;

/// Role name used for RBAC.
///
/// Role names are unique within the role catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

/// Role definition with its granted permissions.
///
/// A role owns a *set* of permission codes: granting the same code twice
/// collapses into one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub id: RoleId,
    pub name: Role,
    pub description: Option<String>,
    pub permissions: BTreeSet<Permission>,
}

impl RoleDefinition {
    pub fn new<I, P>(name: impl Into<Role>, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        Self {
            id: RoleId::new(),
            name: name.into(),
            description: None,
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn grants(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_permission_codes_collapse() {
        let role = RoleDefinition::new("CASHIER", ["sales:manage", "user:read", "sales:manage"]);
        assert_eq!(role.permissions.len(), 2);
        assert!(role.grants(&Permission::new("sales:manage")));
        assert!(!role.grants(&Permission::new("user:delete")));
    }
}
