//! crates/gamification_core/src/engine.rs
//!
//! The gamification engine: the single entry point collaborators call to award
//! points, evaluate achievements and read back derived records.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::achievements::{self, RewardGrant, StatsSnapshot};
use crate::domain::{
    ActivityMetadata, ActivityType, AwardOutcome, NewReward, PointValues, PointValuesPatch,
    RewardDefinition, RewardFilter, RewardPage, RewardPatch, Tier, UserPointsRecord, UserRank,
    UserRewardRecord,
};
use crate::leaderboard;
use crate::ledger;
use crate::locks::UserLocks;
use crate::points::calculate_points;
use crate::ports::{ActivityStatsService, GamificationStore, PortError, PortResult};
use crate::streaks;

/// Attempts per write before a conflict is surfaced to the caller.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Largest page size served by `get_user_rewards`.
pub const MAX_PAGE_SIZE: u64 = 100;

pub struct GamificationEngine {
    store: Arc<dyn GamificationStore>,
    stats: Arc<dyn ActivityStatsService>,
    point_values: RwLock<Arc<PointValues>>,
    user_locks: UserLocks,
}

impl GamificationEngine {
    pub fn new(
        store: Arc<dyn GamificationStore>,
        stats: Arc<dyn ActivityStatsService>,
        point_values: PointValues,
    ) -> Self {
        Self {
            store,
            stats,
            point_values: RwLock::new(Arc::new(point_values)),
            user_locks: UserLocks::new(),
        }
    }

    /// Builds an engine with the rate configuration persisted in the store,
    /// falling back to the defaults when none has been saved yet.
    pub async fn load(
        store: Arc<dyn GamificationStore>,
        stats: Arc<dyn ActivityStatsService>,
    ) -> PortResult<Self> {
        let values = match store.load_point_values().await? {
            Some(values) => values,
            None => {
                info!("No stored point values found; using defaults.");
                PointValues::default()
            }
        };
        values.validate()?;
        Ok(Self::new(store, stats, values))
    }

    //=====================================================================================
    // Points
    //=====================================================================================

    /// Awards points for an activity happening now.
    pub async fn award_points(
        &self,
        user_id: Uuid,
        activity: ActivityType,
        metadata: &ActivityMetadata,
    ) -> PortResult<AwardOutcome> {
        self.award_points_at(user_id, activity, metadata, Utc::now()).await
    }

    /// Awards points for an activity that happened at `at`, then runs one
    /// achievement pass for the user.
    pub async fn award_points_at(
        &self,
        user_id: Uuid,
        activity: ActivityType,
        metadata: &ActivityMetadata,
        at: DateTime<Utc>,
    ) -> PortResult<AwardOutcome> {
        let values = self.point_values();
        let points_earned = calculate_points(activity, metadata, &values);

        let _guard = self.user_locks.acquire(user_id).await;

        let (level_before, record) = self
            .update_with_retry(user_id, &values, at, |record| {
                ledger::apply_points(record, activity.bucket(), points_earned, at, &values)
            })
            .await?;
        info!(
            "Awarded {} points to user {} for {} (total {})",
            points_earned,
            user_id,
            activity.as_str(),
            record.total_points
        );

        // Points are already committed; a failed pass is picked up by the next one.
        let (record, rewards) = match self.achievement_pass(user_id, at, &values).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Achievement evaluation failed for user {}: {:?}", user_id, e);
                (record, Vec::new())
            }
        };

        let level_up = record.current_level > level_before;
        if level_up {
            info!("User {} reached level {} ({})", user_id, record.current_level, record.tier.as_str());
        }

        Ok(AwardOutcome {
            points_earned,
            user_points: record,
            level_up,
            rewards,
        })
    }

    /// The user's points record, created zero-initialized on first read.
    pub async fn get_user_points(&self, user_id: Uuid) -> PortResult<UserPointsRecord> {
        let values = self.point_values();
        self.load_or_create(user_id, &values, Utc::now()).await
    }

    //=====================================================================================
    // Achievements
    //=====================================================================================

    /// Forces an achievement pass and returns the rewards it granted.
    pub async fn check_achievements(&self, user_id: Uuid) -> PortResult<Vec<UserRewardRecord>> {
        let values = self.point_values();
        let _guard = self.user_locks.acquire(user_id).await;
        let (_, granted) = self.achievement_pass(user_id, Utc::now(), &values).await?;
        Ok(granted)
    }

    /// A page of the user's rewards joined with their definitions, newest first.
    pub async fn get_user_rewards(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> PortResult<RewardPage> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let (items, total) = self
            .store
            .page_user_rewards(user_id, (page - 1).saturating_mul(limit), limit)
            .await?;
        Ok(RewardPage {
            items,
            page,
            limit,
            total,
        })
    }

    //=====================================================================================
    // Leaderboard
    //=====================================================================================

    pub async fn get_leaderboard(
        &self,
        limit: usize,
        tier: Option<Tier>,
    ) -> PortResult<Vec<UserPointsRecord>> {
        let records = self.current_records().await?;
        Ok(leaderboard::top_records(records, limit, tier))
    }

    pub async fn get_user_rank(&self, user_id: Uuid) -> PortResult<UserRank> {
        self.get_user_points(user_id).await?;
        let records = self.current_records().await?;
        leaderboard::rank_of(&records, user_id)
            .ok_or_else(|| PortError::NotFound(format!("Points for user {} not found", user_id)))
    }

    //=====================================================================================
    // Reward Administration
    //=====================================================================================

    pub async fn create_reward(&self, new: NewReward) -> PortResult<RewardDefinition> {
        let reward = RewardDefinition::from_new(new, Utc::now());
        reward.validate()?;
        self.store.insert_reward(&reward).await?;
        info!("Created reward {} ({})", reward.id, reward.name);
        Ok(reward)
    }

    pub async fn update_reward(
        &self,
        reward_id: Uuid,
        patch: RewardPatch,
    ) -> PortResult<RewardDefinition> {
        let current = self.store.get_reward(reward_id).await?;
        let updated = current.patched(patch, Utc::now());
        updated.validate()?;
        self.store.update_reward(&updated).await?;
        info!("Updated reward {} ({})", updated.id, updated.name);
        Ok(updated)
    }

    pub async fn delete_reward(&self, reward_id: Uuid) -> PortResult<()> {
        self.store.delete_reward(reward_id).await?;
        info!("Deleted reward {}", reward_id);
        Ok(())
    }

    pub async fn get_all_rewards(
        &self,
        category: Option<String>,
        tier: Option<Tier>,
    ) -> PortResult<Vec<RewardDefinition>> {
        let filter = RewardFilter {
            category,
            tier,
            active_only: false,
        };
        self.store.list_rewards(&filter).await
    }

    //=====================================================================================
    // Rate Configuration
    //=====================================================================================

    /// The current rate snapshot.
    pub fn point_values(&self) -> Arc<PointValues> {
        self.point_values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merges, validates and persists new rates, then swaps the snapshot.
    pub async fn update_point_values(&self, patch: PointValuesPatch) -> PortResult<PointValues> {
        let updated = self.point_values().merged(&patch);
        updated.validate()?;
        self.store.save_point_values(&updated).await?;
        *self
            .point_values
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(updated.clone());
        info!("Point values updated: {:?}", updated);
        Ok(updated)
    }

    //=====================================================================================
    // Internals
    //=====================================================================================

    async fn load_or_create(
        &self,
        user_id: Uuid,
        values: &PointValues,
        now: DateTime<Utc>,
    ) -> PortResult<UserPointsRecord> {
        let mut record = match self.store.get_user_points(user_id).await? {
            Some(record) => record,
            None => {
                debug!("Creating points record for user {}", user_id);
                self.store
                    .create_user_points_if_absent(&UserPointsRecord::new(user_id, values, now))
                    .await?
            }
        };
        // Rates may have changed since the record was written.
        record.refresh_derived(values);
        Ok(record)
    }

    async fn current_records(&self) -> PortResult<Vec<UserPointsRecord>> {
        let values = self.point_values();
        let mut records = self.store.list_user_points().await?;
        for record in &mut records {
            record.refresh_derived(&values);
        }
        Ok(records)
    }

    /// Loads the record, applies `mutate` and saves it, reloading and retrying
    /// on a write conflict. Returns the level before the mutation and the saved record.
    async fn update_with_retry<F>(
        &self,
        user_id: Uuid,
        values: &PointValues,
        at: DateTime<Utc>,
        mut mutate: F,
    ) -> PortResult<(u32, UserPointsRecord)>
    where
        F: FnMut(&mut UserPointsRecord),
    {
        let mut attempt = 1;
        loop {
            let mut record = self.load_or_create(user_id, values, at).await?;
            let level_before = record.current_level;
            mutate(&mut record);
            match self.store.save_user_points(&record).await {
                Ok(saved) => return Ok((level_before, saved)),
                Err(PortError::Conflict(msg)) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!("Retrying points update for user {} after conflict: {}", user_id, msg);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One bounded evaluation pass: snapshot stats once, decide every satisfied
    /// reward, and commit the grants with their bonus points in one write.
    async fn achievement_pass(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
        values: &PointValues,
    ) -> PortResult<(UserPointsRecord, Vec<UserRewardRecord>)> {
        let mut attempt = 1;
        loop {
            let record = self.load_or_create(user_id, values, at).await?;
            let earned: HashMap<Uuid, UserRewardRecord> = self
                .store
                .list_user_rewards(user_id)
                .await?
                .into_iter()
                .map(|r| (r.reward_id, r))
                .collect();
            let rewards = self.store.list_rewards(&RewardFilter::active()).await?;
            let pending = achievements::pending_rewards(rewards, &earned);
            if pending.is_empty() {
                return Ok((record, Vec::new()));
            }

            let snapshot = self.snapshot_stats(user_id, &record, &pending).await?;
            let grants = achievements::evaluate_rewards(user_id, &pending, &earned, &snapshot, at);
            if grants.is_empty() {
                return Ok((record, Vec::new()));
            }

            let mut updated = record.clone();
            let bonus = ledger::apply_reward_grants(&mut updated, &grants, at, values);
            let granted: Vec<UserRewardRecord> = grants.iter().map(|g| g.record.clone()).collect();

            match self.store.commit_reward_grants(&updated, &granted).await {
                Ok(saved) => {
                    log_grants(user_id, &grants, bonus);
                    return Ok((saved, granted));
                }
                Err(PortError::Conflict(msg)) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!("Retrying reward grants for user {} after conflict: {}", user_id, msg);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn snapshot_stats(
        &self,
        user_id: Uuid,
        record: &UserPointsRecord,
        rewards: &[RewardDefinition],
    ) -> PortResult<StatsSnapshot> {
        let scopes: Vec<_> = achievements::required_scopes(rewards).into_iter().collect();
        let fetched = try_join_all(
            scopes
                .iter()
                .map(|scope| self.stats.user_stats(user_id, scope)),
        )
        .await?;

        Ok(StatsSnapshot {
            scoped: scopes.into_iter().zip(fetched).collect(),
            current_streak: record.current_streak,
            streak_started: streaks::streak_start(record.current_streak, record.last_activity_date),
        })
    }
}

fn log_grants(user_id: Uuid, grants: &[RewardGrant], bonus: f64) {
    for grant in grants {
        info!(
            "User {} earned reward {} ({}), times earned: {}",
            user_id, grant.reward.id, grant.reward.name, grant.record.times_earned
        );
    }
    info!("Applied {} bonus points to user {}", bonus, user_id);
}
