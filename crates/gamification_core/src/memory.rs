//! In-memory implementations of the engine's ports.
//!
//! Used by tests and by collaborators that embed the engine without Postgres.
//! The store honours the same version check as the database adapter, and
//! offers hooks to inject write conflicts and failures.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    ActivityStats, EarnedReward, PointValues, Principal, RewardDefinition, RewardFilter,
    StatsScope, UserPointsRecord, UserRewardRecord,
};
use crate::ports::{
    ActivityStatsService, GamificationStore, PortError, PortResult, TokenVerifier,
};

//=========================================================================================
// Store
//=========================================================================================

#[derive(Default)]
struct StoreState {
    // Vectors keep insertion order, which stands in for storage order.
    user_points: Vec<UserPointsRecord>,
    rewards: Vec<RewardDefinition>,
    user_rewards: Vec<UserRewardRecord>,
    point_values: Option<PointValues>,
    pending_conflicts: usize,
    fail_writes: bool,
}

impl StoreState {
    fn check_write(&mut self) -> PortResult<()> {
        if self.fail_writes {
            return Err(PortError::Unexpected("storage unavailable".to_string()));
        }
        if self.pending_conflicts > 0 {
            self.pending_conflicts -= 1;
            return Err(PortError::Conflict("injected conflict".to_string()));
        }
        Ok(())
    }

    fn save_points(&mut self, record: &UserPointsRecord) -> PortResult<UserPointsRecord> {
        let stored = self
            .user_points
            .iter_mut()
            .find(|r| r.user_id == record.user_id)
            .ok_or_else(|| PortError::NotFound(format!("Points for user {} not found", record.user_id)))?;
        if stored.version != record.version {
            return Err(PortError::Conflict(format!(
                "points for user {} changed (version {} != {})",
                record.user_id, stored.version, record.version
            )));
        }
        *stored = UserPointsRecord {
            version: record.version + 1,
            ..record.clone()
        };
        Ok(stored.clone())
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The next `count` writes fail with `PortError::Conflict`.
    pub fn inject_conflicts(&self, count: usize) {
        self.state().pending_conflicts = count;
    }

    /// While set, every write fails with `PortError::Unexpected`.
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Count of reward records for a pair.
    pub fn user_reward_count(&self, user_id: Uuid, reward_id: Uuid) -> usize {
        self.state()
            .user_rewards
            .iter()
            .filter(|r| r.user_id == user_id && r.reward_id == reward_id)
            .count()
    }
}

#[async_trait]
impl GamificationStore for InMemoryStore {
    async fn get_user_points(&self, user_id: Uuid) -> PortResult<Option<UserPointsRecord>> {
        Ok(self
            .state()
            .user_points
            .iter()
            .find(|r| r.user_id == user_id)
            .cloned())
    }

    async fn create_user_points_if_absent(
        &self,
        record: &UserPointsRecord,
    ) -> PortResult<UserPointsRecord> {
        let mut state = self.state();
        if let Some(existing) = state.user_points.iter().find(|r| r.user_id == record.user_id) {
            return Ok(existing.clone());
        }
        if state.fail_writes {
            return Err(PortError::Unexpected("storage unavailable".to_string()));
        }
        let stored = UserPointsRecord {
            version: 1,
            ..record.clone()
        };
        state.user_points.push(stored.clone());
        Ok(stored)
    }

    async fn save_user_points(&self, record: &UserPointsRecord) -> PortResult<UserPointsRecord> {
        let mut state = self.state();
        state.check_write()?;
        state.save_points(record)
    }

    async fn list_user_points(&self) -> PortResult<Vec<UserPointsRecord>> {
        Ok(self.state().user_points.clone())
    }

    async fn list_rewards(&self, filter: &RewardFilter) -> PortResult<Vec<RewardDefinition>> {
        Ok(self
            .state()
            .rewards
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn get_reward(&self, reward_id: Uuid) -> PortResult<RewardDefinition> {
        self.state()
            .rewards
            .iter()
            .find(|r| r.id == reward_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Reward {} not found", reward_id)))
    }

    async fn insert_reward(&self, reward: &RewardDefinition) -> PortResult<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(PortError::Unexpected("storage unavailable".to_string()));
        }
        state.rewards.push(reward.clone());
        Ok(())
    }

    async fn update_reward(&self, reward: &RewardDefinition) -> PortResult<()> {
        let mut state = self.state();
        let stored = state
            .rewards
            .iter_mut()
            .find(|r| r.id == reward.id)
            .ok_or_else(|| PortError::NotFound(format!("Reward {} not found", reward.id)))?;
        *stored = reward.clone();
        Ok(())
    }

    async fn delete_reward(&self, reward_id: Uuid) -> PortResult<()> {
        let mut state = self.state();
        let before = state.rewards.len();
        state.rewards.retain(|r| r.id != reward_id);
        if state.rewards.len() == before {
            return Err(PortError::NotFound(format!("Reward {} not found", reward_id)));
        }
        state.user_rewards.retain(|r| r.reward_id != reward_id);
        Ok(())
    }

    async fn list_user_rewards(&self, user_id: Uuid) -> PortResult<Vec<UserRewardRecord>> {
        Ok(self
            .state()
            .user_rewards
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn page_user_rewards(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> PortResult<(Vec<EarnedReward>, u64)> {
        let state = self.state();
        let mut joined: Vec<EarnedReward> = state
            .user_rewards
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter_map(|record| {
                state
                    .rewards
                    .iter()
                    .find(|d| d.id == record.reward_id)
                    .map(|reward| EarnedReward {
                        record: record.clone(),
                        reward: reward.clone(),
                    })
            })
            .collect();
        joined.sort_by(|a, b| b.record.earned_at.cmp(&a.record.earned_at));

        let total = joined.len() as u64;
        let page = joined
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        Ok((page, total))
    }

    async fn commit_reward_grants(
        &self,
        record: &UserPointsRecord,
        grants: &[UserRewardRecord],
    ) -> PortResult<UserPointsRecord> {
        let mut state = self.state();
        state.check_write()?;

        for grant in grants {
            let duplicate = state
                .user_rewards
                .iter()
                .any(|r| r.reward_id == grant.reward_id && r.user_id == grant.user_id && r.id != grant.id);
            if duplicate {
                return Err(PortError::Conflict(format!(
                    "reward {} already recorded for user {}",
                    grant.reward_id, grant.user_id
                )));
            }
        }

        // Nothing is written until every check has passed.
        let saved = state.save_points(record)?;
        for grant in grants {
            match state.user_rewards.iter().position(|r| r.id == grant.id) {
                Some(index) => state.user_rewards[index] = grant.clone(),
                None => state.user_rewards.push(grant.clone()),
            }
        }
        Ok(saved)
    }

    async fn load_point_values(&self) -> PortResult<Option<PointValues>> {
        Ok(self.state().point_values.clone())
    }

    async fn save_point_values(&self, values: &PointValues) -> PortResult<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(PortError::Unexpected("storage unavailable".to_string()));
        }
        state.point_values = Some(values.clone());
        Ok(())
    }
}

//=========================================================================================
// Collaborator Stats
//=========================================================================================

/// Stats keyed by user and scope; unknown pairs read as all zeros.
#[derive(Default)]
pub struct InMemoryStats {
    stats: Mutex<HashMap<(Uuid, StatsScope), ActivityStats>>,
}

impl InMemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user_id: Uuid, scope: StatsScope, stats: ActivityStats) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((user_id, scope), stats);
    }

    /// Mutates the unscoped stats of a user in place.
    pub fn update<F>(&self, user_id: Uuid, f: F)
    where
        F: FnOnce(&mut ActivityStats),
    {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        f(stats.entry((user_id, StatsScope::default())).or_default());
    }
}

#[async_trait]
impl ActivityStatsService for InMemoryStats {
    async fn user_stats(&self, user_id: Uuid, scope: &StatsScope) -> PortResult<ActivityStats> {
        Ok(self
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(user_id, *scope))
            .cloned()
            .unwrap_or_default())
    }
}

//=========================================================================================
// Token Verification
//=========================================================================================

/// A fixed token table.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify_token(&self, token: &str) -> PortResult<Principal> {
        self.tokens.get(token).cloned().ok_or(PortError::Unauthorized)
    }
}
