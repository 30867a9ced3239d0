//! Login, profile and password change.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
};

use gatekeeper_auth::{AuthService, LoginOutcome, PublicPrincipal};

use crate::app::dto::{ChangePasswordRequest, LoginRequest};
use crate::app::errors::ApiError;
use crate::context::CurrentPrincipal;

/// POST /auth/login
pub async fn login(
    Extension(service): Extension<Arc<AuthService>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginOutcome>, ApiError> {
    let Json(req) = body?;
    let outcome = service.login(&req.username, &req.password).await?;
    Ok(Json(outcome))
}

/// GET /auth/profile
pub async fn profile(
    Extension(service): Extension<Arc<AuthService>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
) -> Result<Json<PublicPrincipal>, ApiError> {
    Ok(Json(service.get_profile(ctx.principal_id()).await?))
}

/// POST /auth/change-password
pub async fn change_password(
    Extension(service): Extension<Arc<AuthService>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(req) = body?;
    let changed = service
        .change_password(ctx.principal_id(), &req.current_password, &req.new_password)
        .await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": changed }))))
}
