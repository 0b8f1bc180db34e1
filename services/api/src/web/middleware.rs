//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use gamification_core::domain::Principal;
use gamification_core::ports::PortError;
use std::sync::Arc;
use tracing::{debug, error};

use crate::web::state::AppState;

/// Middleware that validates the bearer token and resolves the caller.
///
/// If valid, inserts the `Principal` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract the bearer token
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Resolve the token to a principal
    let principal = state.auth.verify_token(token).await.map_err(|e| match e {
        PortError::Unauthorized | PortError::NotFound(_) => {
            debug!("Rejected bearer token");
            StatusCode::UNAUTHORIZED
        }
        other => {
            error!("Failed to verify bearer token: {:?}", other);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    // 3. Insert the principal into request extensions
    req.extensions_mut().insert(principal);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}

/// Rejects callers without the admin role.
pub fn require_admin(principal: &Principal) -> Result<(), (StatusCode, String)> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, "Admin role required".to_string()))
    }
}

/// Rejects callers that may not report learner activity.
pub fn require_activity_reporter(principal: &Principal) -> Result<(), (StatusCode, String)> {
    if principal.can_report_activity() {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            "Only content services may report activity".to_string(),
        ))
    }
}
