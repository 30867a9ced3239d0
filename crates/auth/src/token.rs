//! Signed, time-limited bearer tokens (HS256 JWT).

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use thiserror::Error;

use crate::{Principal, TokenClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token could not be encoded: {0}")]
    Encode(String),

    #[error("token is malformed or its signature does not verify")]
    Decode,

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// A freshly issued bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token issuance and validation.
///
/// `now` is explicit so expiry is checked lazily, at validation time, against a
/// caller-supplied clock.
pub trait TokenManager: Send + Sync {
    fn issue(&self, principal: &Principal, now: DateTime<Utc>) -> Result<IssuedToken, TokenError>;

    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError>;
}

/// HMAC-SHA256 signed JWTs with a server-side secret.
pub struct Hs256TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl Hs256TokenManager {
    pub const DEFAULT_TTL_SECS: i64 = 3600;

    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time checks run in `validate_claims` against the injected clock.
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }
}

impl TokenManager for Hs256TokenManager {
    fn issue(&self, principal: &Principal, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let claims = TokenClaims::for_principal(principal, now, self.ttl);
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: claims.expires_at,
        })
    }

    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "token decode failed");
                TokenError::Decode
            })?;

        validate_claims(&data.claims, now)
            .inspect_err(|e| tracing::debug!(error = %e, sub = %data.claims.sub, "token claims rejected"))?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PasswordHash, RoleDefinition};

    fn alice() -> Principal {
        let mut p = Principal::new("alice", PasswordHash::from_stored("$2b$04$x"));
        p.roles.push(RoleDefinition::new(
            "PHARMACIST",
            ["user:read", "inventory:manage"],
        ));
        p
    }

    fn manager() -> Hs256TokenManager {
        Hs256TokenManager::new(b"test-secret", Duration::hours(1))
    }

    #[test]
    fn roundtrip_before_expiry() {
        let tokens = manager();
        let principal = alice();
        let now = Utc::now();

        let issued = tokens.issue(&principal, now).unwrap();
        let claims = tokens.validate(&issued.token, now).unwrap();

        assert_eq!(claims.sub, principal.id);
        assert_eq!(claims.roles, principal.role_names());
        assert_eq!(claims.expires_at, issued.expires_at);
        assert_eq!(claims.permissions.len(), 2);
    }

    #[test]
    fn rejected_after_ttl() {
        let tokens = manager();
        let now = Utc::now();
        let issued = tokens.issue(&alice(), now).unwrap();

        let later = now + Duration::hours(1) + Duration::seconds(1);
        assert_eq!(
            tokens.validate(&issued.token, later),
            Err(TokenError::Claims(TokenValidationError::Expired))
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let tokens = manager();
        let now = Utc::now();
        let issued = tokens.issue(&alice(), now).unwrap();

        let mut parts: Vec<String> = issued.token.split('.').map(str::to_string).collect();
        // Swap in the payload of a token for someone else; signature no longer matches.
        let other = tokens.issue(&Principal::new("mallory", PasswordHash::from_stored("")), now).unwrap();
        parts[1] = other.token.split('.').nth(1).unwrap().to_string();
        let forged = parts.join(".");

        assert_eq!(tokens.validate(&forged, now), Err(TokenError::Decode));
    }

    #[test]
    fn other_secret_is_rejected() {
        let now = Utc::now();
        let issued = manager().issue(&alice(), now).unwrap();
        let foreign = Hs256TokenManager::new(b"another-secret", Duration::hours(1));
        assert_eq!(foreign.validate(&issued.token, now), Err(TokenError::Decode));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(manager().validate("not.a.jwt", Utc::now()), Err(TokenError::Decode));
    }
}
