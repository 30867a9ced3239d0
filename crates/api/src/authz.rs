//! API-side authorization guard.
//!
//! Checks run against the request's [`AuthContext`] before a handler touches
//! the service.

use tracing::debug;

use gatekeeper_auth::{AuthContext, Requirement, authorize};

use crate::app::errors::ApiError;

pub fn require(ctx: &AuthContext, requirement: &Requirement) -> Result<(), ApiError> {
    authorize(Some(ctx), requirement).map_err(|e| {
        debug!(principal_id = %ctx.principal_id(), requirement = ?requirement, "request denied");
        ApiError(e.into())
    })
}
