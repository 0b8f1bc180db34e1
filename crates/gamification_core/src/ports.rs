//! crates/gamification_core/src/ports.rs
//!
//! Defines the service contracts (traits) the engine depends on.
//! These traits form the boundary of the hexagonal architecture: persistence,
//! the content collaborators' aggregated stats, and token verification are all
//! supplied from outside the core.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    ActivityStats, EarnedReward, PointValues, Principal, RewardDefinition, RewardFilter,
    StatsScope, UserPointsRecord, UserRewardRecord,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port and engine operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Invalid(String),
    /// A concurrent writer changed the record first. Retried inside the engine.
    #[error("Write conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait GamificationStore: Send + Sync {
    // --- User Points ---
    async fn get_user_points(&self, user_id: Uuid) -> PortResult<Option<UserPointsRecord>>;

    /// Inserts `record` unless the user already has one, and returns whichever is stored.
    async fn create_user_points_if_absent(
        &self,
        record: &UserPointsRecord,
    ) -> PortResult<UserPointsRecord>;

    /// Saves the whole record if its `version` still matches the stored one and
    /// returns it with the bumped version. A mismatch yields `PortError::Conflict`.
    async fn save_user_points(&self, record: &UserPointsRecord) -> PortResult<UserPointsRecord>;

    /// Every user's record, in storage order.
    async fn list_user_points(&self) -> PortResult<Vec<UserPointsRecord>>;

    // --- Reward Definitions ---
    async fn list_rewards(&self, filter: &RewardFilter) -> PortResult<Vec<RewardDefinition>>;

    async fn get_reward(&self, reward_id: Uuid) -> PortResult<RewardDefinition>;

    async fn insert_reward(&self, reward: &RewardDefinition) -> PortResult<()>;

    async fn update_reward(&self, reward: &RewardDefinition) -> PortResult<()>;

    /// Deletes the definition together with the user records earned against it.
    async fn delete_reward(&self, reward_id: Uuid) -> PortResult<()>;

    // --- User Rewards ---
    async fn list_user_rewards(&self, user_id: Uuid) -> PortResult<Vec<UserRewardRecord>>;

    /// One page of a user's rewards, newest first, plus the total count.
    async fn page_user_rewards(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> PortResult<(Vec<EarnedReward>, u64)>;

    /// Atomically saves the user's record (version-checked like
    /// `save_user_points`) and upserts the granted reward records.
    async fn commit_reward_grants(
        &self,
        record: &UserPointsRecord,
        grants: &[UserRewardRecord],
    ) -> PortResult<UserPointsRecord>;

    // --- Rate Configuration ---
    async fn load_point_values(&self) -> PortResult<Option<PointValues>>;

    async fn save_point_values(&self, values: &PointValues) -> PortResult<()>;
}

#[async_trait]
pub trait ActivityStatsService: Send + Sync {
    /// Aggregated stats for a user, restricted to `scope` when it names a subject or category.
    async fn user_stats(&self, user_id: Uuid, scope: &StatsScope) -> PortResult<ActivityStats>;
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolves a bearer token to the caller it was issued for.
    async fn verify_token(&self, token: &str) -> PortResult<Principal>;
}
