pub mod achievements;
pub mod domain;
pub mod engine;
pub mod leaderboard;
pub mod ledger;
pub mod levels;
pub mod locks;
pub mod memory;
pub mod points;
pub mod ports;
pub mod rewards;
pub mod streaks;

pub use domain::{
    ActivityMetadata, ActivityStats, ActivityType, AwardOutcome, Criteria, EarnedReward,
    MetricType, NewReward, PointValues, PointValuesPatch, PointsBreakdown, Principal,
    RewardCounts, RewardDefinition, RewardFilter, RewardPage, RewardPatch, RewardType, Role,
    StatsScope, Tier, UserPointsRecord, UserRank, UserRewardRecord,
};
pub use engine::GamificationEngine;
pub use ports::{
    ActivityStatsService, GamificationStore, PortError, PortResult, TokenVerifier,
};
