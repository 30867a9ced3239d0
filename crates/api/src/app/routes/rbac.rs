//! RBAC audit endpoints for transparent authorization debugging.
//!
//! These endpoints answer "why was this request denied?" for the caller's own
//! context, and list the role catalog.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Query, rejection::QueryRejection},
    routing::get,
};

use gatekeeper_auth::{
    AuthError, AuthService, AuthorizationExplanation, Permission, Requirement, RoleDefinition,
    explain_authorization,
};

use crate::app::dto::ExplainQuery;
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::CurrentPrincipal;

pub fn router() -> Router {
    Router::new()
        .route("/roles", get(list_roles))
        .route("/explain", get(explain_authorization_decision))
}

/// GET /admin/rbac/roles - List all roles and their permissions
pub async fn list_roles(
    Extension(service): Extension<Arc<AuthService>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
) -> Result<Json<serde_json::Value>, ApiError> {
    authz::require(&ctx, &Requirement::permission("role:manage"))?;

    let roles: Vec<RoleDefinition> = service.list_roles().await?;
    Ok(Json(serde_json::json!({ "roles": roles })))
}

/// GET /admin/rbac/explain?permission=X - Explain a decision for the caller
pub async fn explain_authorization_decision(
    CurrentPrincipal(ctx): CurrentPrincipal,
    query: Result<Query<ExplainQuery>, QueryRejection>,
) -> Result<Json<AuthorizationExplanation>, ApiError> {
    let Query(query) = query.map_err(|e| AuthError::BadRequest(e.body_text()))?;
    if query.permission.trim().is_empty() {
        return Err(AuthError::BadRequest("permission cannot be empty".to_string()).into());
    }

    let permission = Permission::from(query.permission.trim().to_string());
    Ok(Json(explain_authorization(&ctx, &permission)))
}
