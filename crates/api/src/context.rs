use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use gatekeeper_auth::{AuthContext, AuthError};

use crate::app::errors::ApiError;

/// Authenticated principal for a request.
///
/// Populated by [`crate::middleware::auth_middleware`]; a handler that asks for
/// it on an unprotected route gets `401 unauthenticated`.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or(ApiError(AuthError::Unauthenticated))
    }
}
