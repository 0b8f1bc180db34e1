pub mod admin;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

pub use middleware::require_auth;
pub use rest::ApiDoc;
pub use state::AppState;

/// Builds every gamification route behind the bearer-token middleware.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/gamification/award", post(rest::award_points_handler))
        .route(
            "/gamification/achievements/check",
            post(rest::check_achievements_handler),
        )
        .route("/gamification/points", get(rest::get_points_handler))
        .route("/gamification/rank", get(rest::get_rank_handler))
        .route("/gamification/leaderboard", get(rest::get_leaderboard_handler))
        .route("/gamification/rewards/mine", get(rest::get_my_rewards_handler))
        .route(
            "/gamification/rewards",
            get(rest::list_rewards_handler).post(admin::create_reward_handler),
        )
        .route(
            "/gamification/rewards/{id}",
            put(admin::update_reward_handler).delete(admin::delete_reward_handler),
        )
        .route(
            "/gamification/point-values",
            get(rest::get_point_values_handler).put(admin::update_point_values_handler),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}
