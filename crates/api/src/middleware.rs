use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use gatekeeper_auth::{AuthError, AuthService};

use crate::app::errors::auth_error_to_response;

#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<AuthService>,
}

/// Resolve the bearer token into an [`gatekeeper_auth::AuthContext`] request
/// extension, reloading the principal from the store.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).map_err(auth_error_to_response)?;

    let ctx = state
        .service
        .authenticate(token)
        .await
        .map_err(auth_error_to_response)?;

    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(AuthError::Unauthenticated)?;

    let header = header.to_str().map_err(|_| AuthError::Unauthenticated)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::Unauthenticated)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(AuthError::Unauthenticated);
    }

    Ok(token)
}
