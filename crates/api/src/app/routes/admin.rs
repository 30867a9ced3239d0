//! Principal administration.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};

use gatekeeper_auth::{AuthError, AuthService, NewPrincipal, PublicPrincipal, Requirement};
use gatekeeper_core::PrincipalId;

use crate::app::errors::ApiError;
use crate::authz;
use crate::context::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/principals", post(create_principal))
        .route("/principals/:id", get(get_principal))
        .nest("/rbac", super::rbac::router())
}

/// GET /admin/principals/:id
pub async fn get_principal(
    Extension(service): Extension<Arc<AuthService>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Json<PublicPrincipal>, ApiError> {
    authz::require(&ctx, &Requirement::permission("user:read"))?;

    let id: PrincipalId = id.parse().map_err(AuthError::from)?;
    Ok(Json(service.get_profile(id).await?))
}

/// POST /admin/principals
pub async fn create_principal(
    Extension(service): Extension<Arc<AuthService>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
    body: Result<Json<NewPrincipal>, JsonRejection>,
) -> Result<(StatusCode, Json<PublicPrincipal>), ApiError> {
    authz::require(&ctx, &Requirement::permission("user:create"))?;

    let Json(input) = body?;
    let created = service.register(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
