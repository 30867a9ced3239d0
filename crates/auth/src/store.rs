use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use gatekeeper_core::PrincipalId;

use crate::{CredentialRecord, PasswordHash, Principal, Role, RoleDefinition};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Unique constraint hit (username taken).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    /// The principal was locked when a success write tried to land.
    #[error("principal is locked")]
    Locked,

    /// Adapter I/O failure. The detail is for logs only.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Principal persistence consumed by the auth core.
///
/// Counter mutations are single atomic store operations
/// (increment-and-fetch), never a read in the caller followed by a write,
/// so concurrent failed logins cannot lose an update.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Lookup by normalized username.
    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, StoreError>;

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError>;

    /// Upsert by id. A username held by another principal is `Conflict`.
    async fn save(&self, principal: Principal) -> Result<Principal, StoreError>;

    /// Atomically increment `failed_attempts`, setting `locked` when the new
    /// count reaches `lockout_threshold`. Returns the updated record.
    async fn record_failed_attempt(
        &self,
        id: PrincipalId,
        lockout_threshold: u32,
    ) -> Result<CredentialRecord, StoreError>;

    /// Atomically reset `failed_attempts` and stamp `last_access_at`, unless
    /// the record is locked by then: a locked record is left untouched and
    /// the call fails with `Locked`.
    async fn record_successful_login(
        &self,
        id: PrincipalId,
        at: DateTime<Utc>,
    ) -> Result<CredentialRecord, StoreError>;

    async fn update_password_hash(&self, id: PrincipalId, hash: PasswordHash) -> Result<(), StoreError>;

    /// Roles matching `names`; names with no role are simply absent from the result.
    async fn find_roles_by_name(&self, names: &[Role]) -> Result<Vec<RoleDefinition>, StoreError>;

    async fn list_roles(&self) -> Result<Vec<RoleDefinition>, StoreError>;
}
