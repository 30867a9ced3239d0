use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatekeeper_core::{DomainError, DomainResult, Entity, PrincipalId};

use crate::{MAX_SECRET_BYTES, PasswordHash, Permission, Role, RoleDefinition};

/// Lifecycle state of a credential record.
///
/// `Locked` is terminal: nothing in this crate moves a record back to `Active`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    Active,
    Locked,
}

/// Stored credential of a principal (salt embedded in the bcrypt artifact).
///
/// Deliberately not `Serialize`: nothing holding a password hash should reach a
/// response body by accident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub password_hash: PasswordHash,
    pub last_access_at: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
    pub locked: bool,
}

impl CredentialRecord {
    pub fn new(password_hash: PasswordHash) -> Self {
        Self {
            password_hash,
            last_access_at: None,
            failed_attempts: 0,
            locked: false,
        }
    }

    pub fn state(&self) -> CredentialState {
        if self.locked {
            CredentialState::Locked
        } else {
            CredentialState::Active
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Count one failed attempt. The record locks once the post-increment
    /// count reaches `lockout_threshold`; a locked record stays locked.
    pub fn register_failure(&mut self, lockout_threshold: u32) -> CredentialState {
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        if self.failed_attempts >= lockout_threshold {
            self.locked = true;
        }
        self.state()
    }

    /// Successful authentication: the failure counter resets and the access
    /// timestamp moves forward. Lock state is untouched.
    pub fn register_success(&mut self, at: DateTime<Utc>) {
        self.failed_attempts = 0;
        self.last_access_at = Some(at);
    }
}

/// Beneficiary data attached one-to-one to a principal.
///
/// Opaque to authentication/authorization; carried through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeneficiaryProfile {
    pub discount_category: String,
    #[serde(default)]
    pub discount_rate: Option<f64>,
    #[serde(default)]
    pub medical_observations: Option<String>,
    #[serde(default)]
    pub prescriptions: Vec<serde_json::Value>,
    #[serde(default)]
    pub purchase_history: Vec<serde_json::Value>,
}

/// A user account as held by the credential store.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub id: PrincipalId,
    pub username: String,
    pub email: Option<String>,
    pub active: bool,
    pub credential: CredentialRecord,
    pub roles: Vec<RoleDefinition>,
    /// Direct grants, unioned with role permissions.
    pub permissions: BTreeSet<Permission>,
    pub beneficiary: Option<BeneficiaryProfile>,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    pub fn new(username: impl Into<String>, password_hash: PasswordHash) -> Self {
        Self {
            id: PrincipalId::new(),
            username: username.into(),
            email: None,
            active: true,
            credential: CredentialRecord::new(password_hash),
            roles: Vec::new(),
            permissions: BTreeSet::new(),
            beneficiary: None,
            created_at: Utc::now(),
        }
    }

    pub fn role_names(&self) -> Vec<Role> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }

    /// Copy of this principal with every credential field stripped.
    pub fn to_public(&self) -> PublicPrincipal {
        PublicPrincipal {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            active: self.active,
            roles: self.roles.clone(),
            permissions: self.permissions.iter().cloned().collect(),
            beneficiary: self.beneficiary.clone(),
            last_access_at: self.credential.last_access_at,
            created_at: self.created_at,
        }
    }
}

impl Entity for Principal {
    type Id = PrincipalId;

    fn id(&self) -> PrincipalId {
        self.id
    }
}

/// Principal as returned to callers: no hash, no lockout bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicPrincipal {
    pub id: PrincipalId,
    pub username: String,
    pub email: Option<String>,
    pub active: bool,
    pub roles: Vec<RoleDefinition>,
    pub permissions: Vec<Permission>,
    pub beneficiary: Option<BeneficiaryProfile>,
    pub last_access_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Registration input.
#[derive(Clone, Deserialize)]
pub struct NewPrincipal {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub secret: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub beneficiary: Option<BeneficiaryProfile>,
}

impl core::fmt::Debug for NewPrincipal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewPrincipal")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .field("roles", &self.roles)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

impl NewPrincipal {
    pub fn validate(&self) -> DomainResult<()> {
        if normalize_username(&self.username).is_empty() {
            return Err(DomainError::validation("username cannot be empty"));
        }
        if self.secret.is_empty() {
            return Err(DomainError::validation("password cannot be empty"));
        }
        if self.secret.len() > MAX_SECRET_BYTES {
            return Err(DomainError::validation(format!(
                "password cannot exceed {MAX_SECRET_BYTES} bytes"
            )));
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(DomainError::validation("invalid email format"));
            }
        }
        Ok(())
    }
}

/// Usernames are matched case-insensitively, ignoring surrounding whitespace.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CredentialRecord {
        CredentialRecord::new(PasswordHash::from_stored("$2b$04$placeholder"))
    }

    #[test]
    fn locks_exactly_at_threshold() {
        let mut cred = record();
        for attempt in 1..5 {
            assert_eq!(cred.register_failure(5), CredentialState::Active, "attempt {attempt}");
        }
        assert_eq!(cred.register_failure(5), CredentialState::Locked);
        assert_eq!(cred.failed_attempts, 5);
    }

    #[test]
    fn success_resets_counter_but_not_lock() {
        let mut cred = record();
        cred.failed_attempts = 3;
        cred.locked = true;

        let now = Utc::now();
        cred.register_success(now);

        assert_eq!(cred.failed_attempts, 0);
        assert_eq!(cred.last_access_at, Some(now));
        assert!(cred.is_locked());
    }

    #[test]
    fn public_view_has_no_credential_fields() {
        let mut principal = Principal::new("alice", PasswordHash::from_stored("$2b$04$secret"));
        principal.credential.failed_attempts = 2;

        let json = serde_json::to_value(principal.to_public()).unwrap();
        let text = json.to_string();
        assert!(!text.contains("$2b$04$secret"));
        assert!(json.get("failed_attempts").is_none());
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn new_principal_validation() {
        let mut input = NewPrincipal {
            username: "  ".to_string(),
            email: None,
            secret: "pw".to_string(),
            roles: vec![],
            permissions: vec![],
            beneficiary: None,
        };
        assert!(input.validate().is_err());

        input.username = "Bob".to_string();
        assert!(input.validate().is_ok());

        input.secret.clear();
        assert!(input.validate().is_err());

        input.secret = "x".repeat(MAX_SECRET_BYTES + 1);
        assert!(input.validate().is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let input = NewPrincipal {
            username: "bob".to_string(),
            email: None,
            secret: "hunter2".to_string(),
            roles: vec![],
            permissions: vec![],
            beneficiary: None,
        };
        assert!(!format!("{input:?}").contains("hunter2"));
    }
}
