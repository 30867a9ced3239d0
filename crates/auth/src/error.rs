use thiserror::Error;
use tracing::error;

use gatekeeper_core::DomainError;

use crate::{AuthzError, HashError, StoreError, TokenError};

/// Failures surfaced by [`crate::AuthService`].
///
/// Store and hashing failures collapse into `Internal`; their detail is
/// logged at the conversion point and never carried in the value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account locked")]
    AccountLocked,

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    #[error("invalid token")]
    InvalidToken,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error")]
    Internal,
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AuthError::Conflict(msg),
            StoreError::NotFound => AuthError::NotFound,
            StoreError::Locked => AuthError::AccountLocked,
            StoreError::Backend(detail) => {
                error!(error = %detail, "credential store failure");
                AuthError::Internal
            }
        }
    }
}

impl From<HashError> for AuthError {
    fn from(err: HashError) -> Self {
        error!(error = %err, "password hashing failure");
        AuthError::Internal
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encode(detail) => {
                error!(error = %detail, "token signing failure");
                AuthError::Internal
            }
            TokenError::Decode | TokenError::Claims(_) => AuthError::InvalidToken,
        }
    }
}

impl From<AuthzError> for AuthError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated => AuthError::Unauthenticated,
            AuthzError::Forbidden(msg) => AuthError::Forbidden(msg),
        }
    }
}

impl From<DomainError> for AuthError {
    fn from(err: DomainError) -> Self {
        AuthError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenValidationError;

    #[test]
    fn backend_detail_is_not_carried() {
        let err = AuthError::from(StoreError::Backend("connection refused on 10.0.0.3".into()));
        assert_eq!(err, AuthError::Internal);
        assert!(!err.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn locked_store_write_is_account_locked() {
        assert_eq!(AuthError::from(StoreError::Locked), AuthError::AccountLocked);
    }

    #[test]
    fn every_token_rejection_is_uniform() {
        assert_eq!(AuthError::from(TokenError::Decode), AuthError::InvalidToken);
        assert_eq!(
            AuthError::from(TokenError::Claims(TokenValidationError::Expired)),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn authz_taxonomy_is_preserved() {
        assert_eq!(AuthError::from(AuthzError::Unauthenticated), AuthError::Unauthenticated);
        assert_eq!(
            AuthError::from(AuthzError::Forbidden("x".into())),
            AuthError::Forbidden("x".into())
        );
    }
}
