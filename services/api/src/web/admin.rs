//! services/api/src/web/admin.rs
//!
//! Admin-only handlers: reward definitions and point rates.

use crate::error::port_error_response;
use crate::web::{middleware::require_admin, state::AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use gamification_core::domain::{
    NewReward, PointValues, PointValuesPatch, Principal, RewardDefinition, RewardPatch,
};
use std::sync::Arc;
use uuid::Uuid;

/// Create a reward definition.
#[utoipa::path(
    post,
    path = "/gamification/rewards",
    request_body = NewReward,
    responses(
        (status = 201, description = "Reward created", body = RewardDefinition),
        (status = 400, description = "Invalid reward"),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn create_reward_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(new): Json<NewReward>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_admin(&principal)?;
    let reward = state
        .engine
        .create_reward(new)
        .await
        .map_err(|e| port_error_response(e, "Failed to create reward"))?;
    Ok((StatusCode::CREATED, Json(reward)))
}

/// Update the given fields of a reward definition.
#[utoipa::path(
    put,
    path = "/gamification/rewards/{id}",
    request_body = RewardPatch,
    params(("id" = Uuid, Path, description = "Reward id")),
    responses(
        (status = 200, description = "Reward updated", body = RewardDefinition),
        (status = 400, description = "Invalid reward"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Reward not found")
    )
)]
pub async fn update_reward_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(reward_id): Path<Uuid>,
    Json(patch): Json<RewardPatch>,
) -> Result<Json<RewardDefinition>, (StatusCode, String)> {
    require_admin(&principal)?;
    state
        .engine
        .update_reward(reward_id, patch)
        .await
        .map(Json)
        .map_err(|e| port_error_response(e, "Failed to update reward"))
}

/// Delete a reward definition and every record earned against it.
#[utoipa::path(
    delete,
    path = "/gamification/rewards/{id}",
    params(("id" = Uuid, Path, description = "Reward id")),
    responses(
        (status = 204, description = "Reward deleted"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Reward not found")
    )
)]
pub async fn delete_reward_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(reward_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    require_admin(&principal)?;
    state
        .engine
        .delete_reward(reward_id)
        .await
        .map_err(|e| port_error_response(e, "Failed to delete reward"))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the given point rates.
#[utoipa::path(
    put,
    path = "/gamification/point-values",
    request_body = PointValuesPatch,
    responses(
        (status = 200, description = "Rates updated", body = PointValues),
        (status = 400, description = "Invalid rates"),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn update_point_values_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(patch): Json<PointValuesPatch>,
) -> Result<Json<PointValues>, (StatusCode, String)> {
    require_admin(&principal)?;
    state
        .engine
        .update_point_values(patch)
        .await
        .map(Json)
        .map_err(|e| port_error_response(e, "Failed to update point values"))
}
