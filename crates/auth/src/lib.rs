//! `gatekeeper-auth`: credential verification, bearer tokens and RBAC
//! resolution.
//!
//! This crate is intentionally decoupled from HTTP and storage: persistence is
//! consumed through [`CredentialStore`], and the HTTP layer talks to
//! [`AuthService`].

pub mod authorize;
pub mod claims;
pub mod credentials;
pub mod error;
pub mod password;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod service;
pub mod store;
pub mod token;

pub use authorize::{
    AuthContext, AuthorizationExplanation, AuthzError, DenialKind, DenialReason,
    EffectivePermissions, PrincipalState, Requirement, authorize, explain_authorization,
    has_all_permissions, has_any_role, has_permission,
};
pub use claims::{TokenClaims, TokenValidationError, validate_claims};
pub use credentials::CredentialVerifier;
pub use error::AuthError;
pub use password::{BcryptHasher, HashError, MAX_SECRET_BYTES, PasswordHash, PasswordHasher};
pub use permissions::{Permission, PermissionDefinition};
pub use policy::AuthPolicy;
pub use principal::{
    BeneficiaryProfile, CredentialRecord, CredentialState, NewPrincipal, Principal,
    PublicPrincipal, normalize_username,
};
pub use roles::{Role, RoleDefinition};
pub use service::{AuthService, LoginOutcome};
pub use store::{CredentialStore, StoreError};
pub use token::{Hs256TokenManager, IssuedToken, TokenError, TokenManager};
