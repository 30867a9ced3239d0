//! One-way salted password hashing (bcrypt).
//!
//! The salt is embedded in the bcrypt artifact (`$2b$<cost>$<salt><digest>`),
//! so a stored hash is self-contained and verification needs nothing else.
//! Records hashed with a separately stored salt are not accepted.
//!
//! bcrypt reads at most [`MAX_SECRET_BYTES`] of input. Longer secrets are
//! refused rather than truncated: hashing fails, and verifying one never
//! matches.

use thiserror::Error;

/// bcrypt input limit, in bytes of UTF-8.
pub const MAX_SECRET_BYTES: usize = 72;

/// A bcrypt hash as persisted by the credential store.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap a hash string loaded from storage.
    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    Malformed(String),
}

/// Password hashing primitive.
///
/// Implementations are pure and CPU-bound; async callers run them on the
/// blocking pool.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<PasswordHash, HashError>;

    /// Constant-time comparison of `secret` against `hash`.
    fn verify(&self, secret: &str, hash: &PasswordHash) -> Result<bool, HashError>;
}

/// bcrypt with a configurable cost factor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub const DEFAULT_COST: u32 = 10;

    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, secret: &str) -> Result<PasswordHash, HashError> {
        bcrypt::non_truncating_hash(secret, self.cost)
            .map(PasswordHash)
            .map_err(|e| HashError::Hash(e.to_string()))
    }

    fn verify(&self, secret: &str, hash: &PasswordHash) -> Result<bool, HashError> {
        if hash.as_str().is_empty() || secret.len() > MAX_SECRET_BYTES {
            return Ok(false);
        }
        bcrypt::verify(secret, hash.as_str()).map_err(|e| HashError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn hash_and_verify() {
        let hasher = BcryptHasher::new(TEST_COST);
        let hash = hasher.hash("correct horse").unwrap();

        assert!(hash.as_str().starts_with("$2"));
        assert!(hasher.verify("correct horse", &hash).unwrap());
        assert!(!hasher.verify("wrong horse", &hash).unwrap());
    }

    #[test]
    fn same_secret_hashes_differently() {
        let hasher = BcryptHasher::new(TEST_COST);
        let a = hasher.hash("pw").unwrap();
        let b = hasher.hash("pw").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify("pw", &a).unwrap());
        assert!(hasher.verify("pw", &b).unwrap());
    }

    #[test]
    fn cost_is_encoded_in_artifact() {
        let hash = BcryptHasher::new(5).hash("pw").unwrap();
        assert!(hash.as_str().contains("$05$"));
        // A verifier configured with another cost still reads the embedded one.
        assert!(BcryptHasher::new(TEST_COST).verify("pw", &hash).unwrap());
    }

    #[test]
    fn overlong_secrets_are_not_truncated() {
        let hasher = BcryptHasher::new(TEST_COST);
        let at_limit = "a".repeat(MAX_SECRET_BYTES);
        let hash = hasher.hash(&at_limit).unwrap();
        assert!(hasher.verify(&at_limit, &hash).unwrap());

        let longer = format!("{at_limit}b");
        assert!(!hasher.verify(&longer, &hash).unwrap());
        assert!(matches!(hasher.hash(&longer), Err(HashError::Hash(_))));
    }

    #[test]
    fn empty_hash_never_matches() {
        let hasher = BcryptHasher::new(TEST_COST);
        assert!(!hasher.verify("", &PasswordHash::from_stored("")).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let hasher = BcryptHasher::new(TEST_COST);
        let err = hasher
            .verify("pw", &PasswordHash::from_stored("not-a-bcrypt-hash"))
            .unwrap_err();
        assert!(matches!(err, HashError::Malformed(_)));
    }

    #[test]
    fn debug_does_not_leak_hash() {
        let hash = PasswordHash::from_stored("$2b$04$abcdef");
        assert!(!format!("{hash:?}").contains("abcdef"));
    }
}
