use axum::{
    Router,
    routing::{get, post},
};

pub mod admin;
pub mod auth;
pub mod rbac;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/auth/profile", get(auth::profile))
        .route("/auth/change-password", post(auth::change_password))
        .nest("/admin", admin::router())
}
