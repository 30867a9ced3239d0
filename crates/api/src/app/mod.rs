//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: credential store selection and `AuthService` construction
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use gatekeeper_auth::AuthService;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router around an already wired `AuthService`.
pub fn build_app(service: Arc<AuthService>) -> Router {
    let auth_state = middleware::AuthState {
        service: service.clone(),
    };

    // Protected routes: a valid bearer token for a current principal.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/auth/login", post(routes::auth::login))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(service)))
}
