//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the learner-facing REST endpoints and the
//! master definition for the OpenAPI specification.

use crate::error::port_error_response;
use crate::web::{admin, middleware::require_activity_reporter, state::AppState};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use gamification_core::domain::{
    ActivityMetadata, ActivityType, AwardOutcome, Criteria, EarnedReward, MetricType,
    NewReward, PointValues, PointValuesPatch, Principal, RewardDefinition, RewardPage,
    RewardPatch, RewardType, Tier, UserPointsRecord, UserRank, UserRewardRecord,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{IntoParams, Modify, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        award_points_handler,
        check_achievements_handler,
        get_points_handler,
        get_rank_handler,
        get_leaderboard_handler,
        get_my_rewards_handler,
        list_rewards_handler,
        get_point_values_handler,
        admin::create_reward_handler,
        admin::update_reward_handler,
        admin::delete_reward_handler,
        admin::update_point_values_handler,
    ),
    components(
        schemas(
            AwardRequest, AwardOutcome, UserPointsRecord, UserRewardRecord, UserRank,
            RewardDefinition, RewardPage, EarnedReward, NewReward, RewardPatch, Criteria,
            MetricType, RewardType, Tier, ActivityType, PointValues, PointValuesPatch
        )
    ),
    modifiers(&SecurityAddon),
    security(("bearer_auth" = [])),
    tags(
        (name = "Gamification API", description = "Points, levels, streaks, rewards and leaderboards.")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

//=========================================================================================
// API Payload Structs
//=========================================================================================

/// An activity event reported by a content service for a learner.
#[derive(Deserialize, ToSchema)]
pub struct AwardRequest {
    #[serde(alias = "userId")]
    pub user_id: Uuid,
    #[serde(alias = "activityType")]
    pub activity_type: ActivityType,
    /// Activity-specific fields; unreadable metadata scores zero points.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaderboardQuery {
    /// Number of entries, default 10.
    pub limit: Option<usize>,
    pub tier: Option<Tier>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RewardListQuery {
    pub category: Option<String>,
    pub tier: Option<Tier>,
}

const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
const DEFAULT_PAGE_LIMIT: u64 = 20;

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Award points to a learner for an activity, then evaluate achievements.
///
/// Called by the content services; learners cannot report their own activity.
#[utoipa::path(
    post,
    path = "/gamification/award",
    request_body = AwardRequest,
    responses(
        (status = 200, description = "Points awarded", body = AwardOutcome),
        (status = 400, description = "Activity type is awarded by the engine only"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Service or admin role required"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn award_points_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<AwardRequest>,
) -> Result<Json<AwardOutcome>, (StatusCode, String)> {
    require_activity_reporter(&principal)?;
    if req.activity_type.is_engine_issued() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} points are awarded by the engine only", req.activity_type.as_str()),
        ));
    }
    let metadata = ActivityMetadata::from_value(req.metadata);
    state
        .engine
        .award_points(req.user_id, req.activity_type, &metadata)
        .await
        .map(Json)
        .map_err(|e| port_error_response(e, "Failed to award points"))
}

/// Force an achievement pass for the caller.
#[utoipa::path(
    post,
    path = "/gamification/achievements/check",
    responses(
        (status = 200, description = "Rewards granted by this pass", body = [UserRewardRecord]),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn check_achievements_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<UserRewardRecord>>, (StatusCode, String)> {
    state
        .engine
        .check_achievements(principal.user_id)
        .await
        .map(Json)
        .map_err(|e| port_error_response(e, "Failed to check achievements"))
}

/// The caller's points record.
#[utoipa::path(
    get,
    path = "/gamification/points",
    responses(
        (status = 200, description = "Points record", body = UserPointsRecord),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn get_points_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<UserPointsRecord>, (StatusCode, String)> {
    state
        .engine
        .get_user_points(principal.user_id)
        .await
        .map(Json)
        .map_err(|e| port_error_response(e, "Failed to load points"))
}

/// The caller's leaderboard position.
#[utoipa::path(
    get,
    path = "/gamification/rank",
    responses(
        (status = 200, description = "Rank and percentile", body = UserRank),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn get_rank_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<UserRank>, (StatusCode, String)> {
    state
        .engine
        .get_user_rank(principal.user_id)
        .await
        .map(Json)
        .map_err(|e| port_error_response(e, "Failed to compute rank"))
}

/// Top users by total points.
#[utoipa::path(
    get,
    path = "/gamification/leaderboard",
    params(LeaderboardQuery),
    responses(
        (status = 200, description = "Leaderboard entries", body = [UserPointsRecord]),
        (status = 400, description = "Invalid query"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn get_leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<UserPointsRecord>>, (StatusCode, String)> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, state.config.leaderboard_max_limit);
    state
        .engine
        .get_leaderboard(limit, query.tier)
        .await
        .map(Json)
        .map_err(|e| port_error_response(e, "Failed to load leaderboard"))
}

/// The caller's earned rewards, newest first.
#[utoipa::path(
    get,
    path = "/gamification/rewards/mine",
    params(PageQuery),
    responses(
        (status = 200, description = "A page of earned rewards", body = RewardPage),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn get_my_rewards_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PageQuery>,
) -> Result<Json<RewardPage>, (StatusCode, String)> {
    state
        .engine
        .get_user_rewards(
            principal.user_id,
            query.page.unwrap_or(1),
            query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
        .await
        .map(Json)
        .map_err(|e| port_error_response(e, "Failed to load rewards"))
}

/// Every reward definition, optionally filtered.
#[utoipa::path(
    get,
    path = "/gamification/rewards",
    params(RewardListQuery),
    responses(
        (status = 200, description = "Reward definitions", body = [RewardDefinition]),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn list_rewards_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RewardListQuery>,
) -> Result<Json<Vec<RewardDefinition>>, (StatusCode, String)> {
    state
        .engine
        .get_all_rewards(query.category, query.tier)
        .await
        .map(Json)
        .map_err(|e| port_error_response(e, "Failed to list rewards"))
}

/// The current point rates and level curve.
#[utoipa::path(
    get,
    path = "/gamification/point-values",
    responses(
        (status = 200, description = "Current rates", body = PointValues),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn get_point_values_handler(State(state): State<Arc<AppState>>) -> Json<PointValues> {
    Json(state.engine.point_values().as_ref().clone())
}
