use chrono::Duration;

use crate::BcryptHasher;

/// Tunables of the authentication core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
    /// Consecutive failures after which a credential locks.
    pub lockout_threshold: u32,
    pub token_ttl: Duration,
    pub bcrypt_cost: u32,
}

impl AuthPolicy {
    pub const DEFAULT_LOCKOUT_THRESHOLD: u32 = 5;
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            lockout_threshold: Self::DEFAULT_LOCKOUT_THRESHOLD,
            token_ttl: Duration::hours(1),
            bcrypt_cost: BcryptHasher::DEFAULT_COST,
        }
    }
}
