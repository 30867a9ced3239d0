//! Credential verification: lookup, hash comparison and lockout bookkeeping.
//!
//! State machine over [`CredentialRecord`](crate::CredentialRecord):
//!
//! ```text
//! ACTIVE --(wrong secret, count+1 < threshold)--> ACTIVE
//! ACTIVE --(wrong secret, count+1 >= threshold)--> LOCKED
//! ACTIVE --(correct secret)--> ACTIVE (count = 0)
//! LOCKED --(any attempt)--> LOCKED (no comparison, no mutation)
//! ```
//!
//! The success write is conditional on the record still being unlocked, so a
//! failure that locks the account mid-attempt wins over a correct secret.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use gatekeeper_core::PrincipalId;

use crate::{
    AuthError, MAX_SECRET_BYTES, PasswordHash, PasswordHasher, Principal, StoreError,
    normalize_username,
};

const DUMMY_SECRET: &str = "gatekeeper-timing-equalizer";

/// Run a hash on the blocking pool.
pub(crate) async fn hash_secret(
    hasher: &Arc<dyn PasswordHasher>,
    secret: &str,
) -> Result<PasswordHash, AuthError> {
    let hasher = Arc::clone(hasher);
    let secret = secret.to_owned();
    let hash = tokio::task::spawn_blocking(move || hasher.hash(&secret))
        .await
        .map_err(|e| {
            error!(error = %e, "password hashing task failed");
            AuthError::Internal
        })??;
    Ok(hash)
}

/// Run a verification on the blocking pool.
pub(crate) async fn verify_secret(
    hasher: &Arc<dyn PasswordHasher>,
    secret: &str,
    hash: PasswordHash,
) -> Result<bool, AuthError> {
    let hasher = Arc::clone(hasher);
    let secret = secret.to_owned();
    let matches = tokio::task::spawn_blocking(move || hasher.verify(&secret, &hash))
        .await
        .map_err(|e| {
            error!(error = %e, "password verification task failed");
            AuthError::Internal
        })??;
    Ok(matches)
}

pub struct CredentialVerifier {
    store: Arc<dyn crate::CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    lockout_threshold: u32,
    dummy_hash: OnceLock<PasswordHash>,
}

impl CredentialVerifier {
    pub fn new(
        store: Arc<dyn crate::CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        lockout_threshold: u32,
    ) -> Self {
        Self {
            store,
            hasher,
            lockout_threshold,
            dummy_hash: OnceLock::new(),
        }
    }

    /// Authenticate `username` with `secret`.
    ///
    /// Unknown usernames, inactive principals and wrong secrets all fail with
    /// the same `InvalidCredentials`. A failed comparison is persisted before
    /// returning; if that write fails the outcome is still
    /// `InvalidCredentials`.
    #[instrument(skip(self, secret), fields(username = %username))]
    pub async fn attempt_login(
        &self,
        username: &str,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthError> {
        let username = normalize_username(username);

        let Some(mut principal) = self.store.find_by_username(&username).await? else {
            self.equalize_timing(secret).await;
            warn!("login failed: unknown username");
            return Err(AuthError::InvalidCredentials);
        };

        if principal.credential.is_locked() {
            warn!(principal_id = %principal.id, "login rejected: account locked");
            return Err(AuthError::AccountLocked);
        }

        if !principal.active {
            warn!(principal_id = %principal.id, "login rejected: principal inactive");
            return Err(AuthError::InvalidCredentials);
        }

        let matches = verify_secret(
            &self.hasher,
            secret,
            principal.credential.password_hash.clone(),
        )
        .await?;

        if !matches {
            self.register_failure(principal.id).await;
            return Err(AuthError::InvalidCredentials);
        }

        principal.credential = match self.store.record_successful_login(principal.id, now).await {
            Ok(record) => record,
            // Deleted between lookup and write.
            Err(StoreError::NotFound) => return Err(AuthError::InvalidCredentials),
            // Locked by a concurrent failure after the lookup.
            Err(StoreError::Locked) => {
                warn!(principal_id = %principal.id, "login rejected: account locked during attempt");
                return Err(AuthError::AccountLocked);
            }
            Err(err) => return Err(err.into()),
        };

        info!(principal_id = %principal.id, "login succeeded");
        Ok(principal)
    }

    /// Replace the stored hash after checking `current_secret`.
    ///
    /// Lockout state is left as is.
    #[instrument(skip(self, current_secret, new_secret), fields(principal_id = %id))]
    pub async fn change_password(
        &self,
        id: PrincipalId,
        current_secret: &str,
        new_secret: &str,
    ) -> Result<(), AuthError> {
        let principal = self.store.find_by_id(id).await?.ok_or(AuthError::NotFound)?;

        let matches = verify_secret(
            &self.hasher,
            current_secret,
            principal.credential.password_hash.clone(),
        )
        .await?;
        if !matches {
            warn!("password change rejected: current password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        if new_secret.is_empty() {
            return Err(AuthError::BadRequest("new password cannot be empty".to_string()));
        }
        if new_secret.len() > MAX_SECRET_BYTES {
            return Err(AuthError::BadRequest(format!(
                "new password cannot exceed {MAX_SECRET_BYTES} bytes"
            )));
        }

        let hash = hash_secret(&self.hasher, new_secret).await?;
        self.store.update_password_hash(id, hash).await?;

        info!("password changed");
        Ok(())
    }

    async fn register_failure(&self, id: PrincipalId) {
        match self.store.record_failed_attempt(id, self.lockout_threshold).await {
            Ok(record) if record.is_locked() => {
                warn!(
                    principal_id = %id,
                    failed_attempts = record.failed_attempts,
                    "account locked after repeated login failures"
                );
            }
            Ok(record) => {
                warn!(
                    principal_id = %id,
                    failed_attempts = record.failed_attempts,
                    "login failed: wrong password"
                );
            }
            Err(err) => {
                error!(principal_id = %id, error = %err, "failed to persist failed login attempt");
            }
        }
    }

    /// Spend one verification on a fixed hash so unknown usernames cost the
    /// same as wrong passwords.
    async fn equalize_timing(&self, secret: &str) {
        let dummy = match self.dummy_hash.get() {
            Some(hash) => hash.clone(),
            None => match hash_secret(&self.hasher, DUMMY_SECRET).await {
                Ok(hash) => self.dummy_hash.get_or_init(|| hash).clone(),
                Err(_) => return,
            },
        };

        if let Err(err) = verify_secret(&self.hasher, secret, dummy).await {
            debug!(error = ?err, "dummy verification failed");
        }
    }
}
