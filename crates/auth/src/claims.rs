use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatekeeper_core::PrincipalId;

use crate::{EffectivePermissions, Permission, Principal, Role};

/// Bearer token claims.
///
/// The payload is signed, not encrypted: it carries identifiers and a
/// role/permission snapshot, never credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject / principal identifier.
    pub sub: PrincipalId,

    /// Role names held when the token was issued.
    pub roles: Vec<Role>,

    /// Effective permission snapshot at issue time (informational; requests
    /// are authorized against the principal's current permissions).
    pub permissions: Vec<Permission>,

    /// Issued-at timestamp.
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl TokenClaims {
    /// Claims for `principal`, valid from `now` (truncated to whole seconds)
    /// for `ttl`.
    pub fn for_principal(principal: &Principal, now: DateTime<Utc>, ttl: Duration) -> Self {
        let issued_at = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        Self {
            sub: principal.id,
            roles: principal.role_names(),
            permissions: EffectivePermissions::of(principal).into_iter().collect(),
            issued_at,
            expires_at: issued_at + ttl,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate token claims against `now`.
///
/// Signature verification happens before this, in the token manager.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PasswordHash;

    fn claims(issued_at: DateTime<Utc>, ttl: Duration) -> TokenClaims {
        let principal = Principal::new("alice", PasswordHash::from_stored(""));
        TokenClaims::for_principal(&principal, issued_at, ttl)
    }

    #[test]
    fn valid_inside_window() {
        let now = Utc::now();
        let c = claims(now, Duration::hours(1));
        assert_eq!(validate_claims(&c, now), Ok(()));
        assert_eq!(validate_claims(&c, now + Duration::minutes(59)), Ok(()));
    }

    #[test]
    fn expired_at_and_after_ttl() {
        let now = Utc::now();
        let c = claims(now, Duration::hours(1));
        assert_eq!(
            validate_claims(&c, c.expires_at),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&c, now + Duration::hours(2)),
            Err(TokenValidationError::Expired)
        );
    }

    #[test]
    fn future_tokens_are_rejected() {
        let now = Utc::now();
        let c = claims(now + Duration::minutes(5), Duration::hours(1));
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::NotYetValid));
    }

    #[test]
    fn zero_ttl_is_an_invalid_window() {
        let c = claims(Utc::now(), Duration::zero());
        assert_eq!(
            validate_claims(&c, c.issued_at),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }
}
