use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use gatekeeper_core::PrincipalId;

use crate::{Permission, Principal, Role, RoleDefinition};

/// Union of permission codes reachable from a principal's roles plus its
/// direct grants.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct EffectivePermissions(BTreeSet<Permission>);

impl EffectivePermissions {
    pub fn of(principal: &Principal) -> Self {
        Self::from_parts(&principal.roles, &principal.permissions)
    }

    pub fn from_parts<'a, R, D>(roles: R, direct: D) -> Self
    where
        R: IntoIterator<Item = &'a RoleDefinition>,
        D: IntoIterator<Item = &'a Permission>,
    {
        let mut set: BTreeSet<Permission> = roles
            .into_iter()
            .flat_map(|role| role.permissions.iter().cloned())
            .collect();
        set.extend(direct.into_iter().cloned());
        Self(set)
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for EffectivePermissions {
    type Item = Permission;
    type IntoIter = std::collections::btree_set::IntoIter<Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Authenticated request context.
///
/// Built once per request from the principal's current store record; the
/// effective permission set is computed at construction and reused by every
/// check made while handling that request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    principal_id: PrincipalId,
    username: String,
    roles: Vec<RoleDefinition>,
    effective: EffectivePermissions,
}

impl AuthContext {
    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn roles(&self) -> &[RoleDefinition] {
        &self.roles
    }

    pub fn role_names(&self) -> impl Iterator<Item = &Role> {
        self.roles.iter().map(|r| &r.name)
    }

    pub fn effective_permissions(&self) -> &EffectivePermissions {
        &self.effective
    }
}

impl From<&Principal> for AuthContext {
    fn from(principal: &Principal) -> Self {
        Self {
            principal_id: principal.id,
            username: principal.username.clone(),
            roles: principal.roles.clone(),
            effective: EffectivePermissions::of(principal),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),
}

/// What a request needs from its principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Any valid session.
    Authenticated,
    Permission(Permission),
    /// Every listed code (AND).
    AllPermissions(Vec<Permission>),
    /// At least one of the listed roles (OR).
    AnyRole(Vec<Role>),
}

impl Requirement {
    pub fn permission(code: impl Into<Permission>) -> Self {
        Self::Permission(code.into())
    }
}

pub fn has_permission(ctx: &AuthContext, required: &Permission) -> bool {
    ctx.effective.contains(required)
}

/// True iff at least one of the principal's role names is in `required`.
pub fn has_any_role(ctx: &AuthContext, required: &[Role]) -> bool {
    ctx.role_names().any(|name| required.contains(name))
}

/// True iff every code in `required` is in the effective set.
pub fn has_all_permissions(ctx: &AuthContext, required: &[Permission]) -> bool {
    required.iter().all(|p| ctx.effective.contains(p))
}

/// Check `requirement` for an optional authenticated context.
///
/// - No IO
/// - No panics
/// - `None` is always `Unauthenticated`, never `Forbidden`
pub fn authorize(ctx: Option<&AuthContext>, requirement: &Requirement) -> Result<(), AuthzError> {
    let ctx = ctx.ok_or(AuthzError::Unauthenticated)?;

    match requirement {
        Requirement::Authenticated => Ok(()),
        Requirement::Permission(p) => {
            if has_permission(ctx, p) {
                Ok(())
            } else {
                Err(AuthzError::Forbidden(format!("missing permission '{p}'")))
            }
        }
        Requirement::AllPermissions(required) => {
            if has_all_permissions(ctx, required) {
                Ok(())
            } else {
                let missing: Vec<&str> = required
                    .iter()
                    .filter(|p| !ctx.effective.contains(p))
                    .map(|p| p.as_str())
                    .collect();
                Err(AuthzError::Forbidden(format!(
                    "missing permissions: {}",
                    missing.join(", ")
                )))
            }
        }
        Requirement::AnyRole(required) => {
            if has_any_role(ctx, required) {
                Ok(())
            } else {
                let names: Vec<&str> = required.iter().map(|r| r.as_str()).collect();
                Err(AuthzError::Forbidden(format!(
                    "requires one of roles: {}",
                    names.join(", ")
                )))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    /// The permission that was being checked.
    pub required_permission: String,

    /// Whether the authorization was granted.
    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    /// Details about the principal's state.
    pub principal: PrincipalState,

    /// If denied, this explains what was missing.
    pub denial_reason: Option<DenialReason>,
}

/// Current state of the principal being checked.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub principal_id: PrincipalId,
    pub roles: Vec<String>,
    pub effective_permissions: Vec<String>,
    /// Roles (among the principal's own) that carry the permission.
    pub granting_roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    MissingPermission,
}

/// Explain why `ctx` is (or is not) granted `required`.
pub fn explain_authorization(ctx: &AuthContext, required: &Permission) -> AuthorizationExplanation {
    let required_str = required.as_str();

    let granting_roles: Vec<String> = ctx
        .roles
        .iter()
        .filter(|r| r.grants(required))
        .map(|r| r.name.as_str().to_string())
        .collect();

    let state = PrincipalState {
        principal_id: ctx.principal_id,
        roles: ctx.role_names().map(|r| r.as_str().to_string()).collect(),
        effective_permissions: ctx.effective.iter().map(|p| p.as_str().to_string()).collect(),
        granting_roles: granting_roles.clone(),
    };

    if has_permission(ctx, required) {
        let reason = if granting_roles.is_empty() {
            format!("Principal holds '{}' as a direct grant", required_str)
        } else {
            format!(
                "Permission '{}' granted by role(s): {}",
                required_str,
                granting_roles.join(", ")
            )
        };

        return AuthorizationExplanation {
            required_permission: required_str.to_string(),
            granted: true,
            reason,
            principal: state,
            denial_reason: None,
        };
    }

    AuthorizationExplanation {
        required_permission: required_str.to_string(),
        granted: false,
        reason: format!(
            "Principal does not have permission '{}'. Current permissions: {:?}",
            required_str, state.effective_permissions
        ),
        principal: state,
        denial_reason: Some(DenialReason {
            kind: DenialKind::MissingPermission,
            message: format!("Missing required permission: '{}'", required_str),
            suggestions: vec![
                format!("Assign a role that grants the '{}' permission", required_str),
                format!("Grant the '{}' permission directly to the principal", required_str),
            ],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PasswordHash;
    use proptest::prelude::*;

    fn principal_with(roles: Vec<RoleDefinition>, direct: &[&str]) -> Principal {
        let mut p = Principal::new("alice", PasswordHash::from_stored(""));
        p.roles = roles;
        p.permissions = direct.iter().map(|c| Permission::from(*c)).collect();
        p
    }

    fn alice() -> AuthContext {
        let pharmacist = RoleDefinition::new("PHARMACIST", ["user:read", "inventory:manage"]);
        AuthContext::from(&principal_with(vec![pharmacist], &[]))
    }

    #[test]
    fn pharmacist_scenario() {
        let ctx = alice();
        assert!(has_permission(&ctx, &Permission::new("inventory:manage")));
        assert!(!has_permission(&ctx, &Permission::new("user:delete")));
    }

    #[test]
    fn all_permissions_is_and_not_or() {
        let only_a = AuthContext::from(&principal_with(
            vec![RoleDefinition::new("R", ["A"])],
            &[],
        ));
        let both = [Permission::new("A"), Permission::new("B")];
        assert!(!has_all_permissions(&only_a, &both));

        let a_and_b = AuthContext::from(&principal_with(
            vec![RoleDefinition::new("R1", ["A"]), RoleDefinition::new("R2", ["B"])],
            &[],
        ));
        assert!(has_all_permissions(&a_and_b, &both));
    }

    #[test]
    fn direct_grants_union_with_roles() {
        let ctx = AuthContext::from(&principal_with(
            vec![RoleDefinition::new("CASHIER", ["sales:manage"])],
            &["reports:view"],
        ));
        assert!(has_all_permissions(
            &ctx,
            &[Permission::new("sales:manage"), Permission::new("reports:view")]
        ));
        assert_eq!(ctx.effective_permissions().len(), 2);
    }

    #[test]
    fn overlapping_roles_collapse() {
        let ctx = AuthContext::from(&principal_with(
            vec![
                RoleDefinition::new("CASHIER", ["user:read", "sales:manage"]),
                RoleDefinition::new("SELLER", ["user:read", "sales:manage"]),
            ],
            &["user:read"],
        ));
        assert_eq!(ctx.effective_permissions().len(), 2);
    }

    #[test]
    fn any_role_needs_a_non_empty_intersection() {
        let ctx = alice();
        assert!(has_any_role(&ctx, &[Role::new("ADMIN"), Role::new("PHARMACIST")]));
        assert!(!has_any_role(&ctx, &[Role::new("ADMIN")]));
        assert!(!has_any_role(&ctx, &[]));
    }

    #[test]
    fn missing_context_is_unauthenticated_not_forbidden() {
        for req in [
            Requirement::Authenticated,
            Requirement::permission("user:read"),
            Requirement::AllPermissions(vec![Permission::new("user:read")]),
            Requirement::AnyRole(vec![Role::new("ADMIN")]),
        ] {
            assert_eq!(authorize(None, &req), Err(AuthzError::Unauthenticated));
        }
    }

    #[test]
    fn insufficient_rights_are_forbidden() {
        let ctx = alice();
        assert_eq!(authorize(Some(&ctx), &Requirement::Authenticated), Ok(()));
        assert_eq!(authorize(Some(&ctx), &Requirement::permission("inventory:manage")), Ok(()));

        let err = authorize(
            Some(&ctx),
            &Requirement::AllPermissions(vec![
                Permission::new("user:read"),
                Permission::new("user:delete"),
            ]),
        )
        .unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("missing permissions: user:delete".to_string()));

        assert!(matches!(
            authorize(Some(&ctx), &Requirement::AnyRole(vec![Role::new("ADMIN")])),
            Err(AuthzError::Forbidden(_))
        ));
    }

    #[test]
    fn explanation_names_granting_role() {
        let ctx = alice();
        let granted = explain_authorization(&ctx, &Permission::new("inventory:manage"));
        assert!(granted.granted);
        assert_eq!(granted.principal.granting_roles, vec!["PHARMACIST".to_string()]);
        assert!(granted.denial_reason.is_none());

        let denied = explain_authorization(&ctx, &Permission::new("user:delete"));
        assert!(!denied.granted);
        assert_eq!(
            denied.denial_reason.map(|d| d.kind),
            Some(DenialKind::MissingPermission)
        );
    }

    fn code() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["a", "b", "c", "d", "e", "f"]).prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn all_permissions_matches_subset_of_union(
            role_a in prop::collection::vec(code(), 0..4),
            role_b in prop::collection::vec(code(), 0..4),
            direct in prop::collection::vec(code(), 0..3),
            required in prop::collection::vec(code(), 0..4),
        ) {
            let direct_refs: Vec<&str> = direct.iter().map(String::as_str).collect();
            let principal = principal_with(
                vec![
                    RoleDefinition::new("RA", role_a.clone()),
                    RoleDefinition::new("RB", role_b.clone()),
                ],
                &direct_refs,
            );
            let ctx = AuthContext::from(&principal);

            let union: BTreeSet<String> = role_a.into_iter().chain(role_b).chain(direct).collect();
            let required_perms: Vec<Permission> =
                required.iter().cloned().map(Permission::from).collect();

            let expected = required.iter().all(|c| union.contains(c));
            prop_assert_eq!(has_all_permissions(&ctx, &required_perms), expected);

            for c in &required {
                prop_assert_eq!(has_permission(&ctx, &Permission::from(c.clone())), union.contains(c));
            }
        }
    }
}
