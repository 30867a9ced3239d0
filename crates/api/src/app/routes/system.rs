use axum::{Json, http::StatusCode, response::IntoResponse};

use crate::context::CurrentPrincipal;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(CurrentPrincipal(ctx): CurrentPrincipal) -> impl IntoResponse {
    Json(serde_json::json!({
        "principal_id": ctx.principal_id().to_string(),
        "username": ctx.username(),
        "roles": ctx.role_names().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": ctx.effective_permissions(),
    }))
}
