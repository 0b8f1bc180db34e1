//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `GamificationStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use gamification_core::domain::{
    Criteria, EarnedReward, MetricType, PointValues, PointsBreakdown, RewardCounts,
    RewardDefinition, RewardFilter, RewardType, Tier, UserPointsRecord, UserRewardRecord,
};
use gamification_core::ports::{GamificationStore, PortError, PortResult};
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `GamificationStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const REWARD_COLUMNS: &str = "id, name, description, reward_type, category, icon, color, points, \
     tier, metric_type, target, subject_id, category_id, is_active, is_repeatable, \
     created_at, updated_at";

const USER_POINTS_COLUMNS: &str = "user_id, total_points, current_level, points_to_next_level, \
     tier, current_streak, longest_streak, last_activity_date, lessons_points, quizzes_points, \
     puzzles_points, coding_points, achievements_points, bonuses_points, badges_count, \
     achievements_count, milestones_count, version, created_at, updated_at";

const USER_REWARD_COLUMNS: &str = "id, user_id, reward_id, earned_at, times_earned, metadata";

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Unique violations on writes mean another writer got there first.
fn write_error(e: sqlx::Error) -> PortError {
    let unique_violation = e
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505");
    if unique_violation {
        PortError::Conflict(e.to_string())
    } else {
        unexpected(e)
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct RewardRecord {
    id: Uuid,
    name: String,
    description: String,
    reward_type: String,
    category: String,
    icon: String,
    color: String,
    points: f64,
    tier: String,
    metric_type: String,
    target: f64,
    subject_id: Option<Uuid>,
    category_id: Option<Uuid>,
    is_active: bool,
    is_repeatable: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl RewardRecord {
    fn to_domain(self) -> PortResult<RewardDefinition> {
        let reward_type = RewardType::parse(&self.reward_type).ok_or_else(|| {
            PortError::Unexpected(format!(
                "Reward {} has unknown type '{}'",
                self.id, self.reward_type
            ))
        })?;
        let tier = Tier::parse(&self.tier).ok_or_else(|| {
            PortError::Unexpected(format!("Reward {} has unknown tier '{}'", self.id, self.tier))
        })?;
        Ok(RewardDefinition {
            id: self.id,
            name: self.name,
            description: self.description,
            reward_type,
            category: self.category,
            icon: self.icon,
            color: self.color,
            points: self.points,
            tier,
            // Unknown metric types load fine and are skipped during evaluation.
            criteria: Criteria {
                metric_type: MetricType::parse(&self.metric_type),
                target: self.target,
                subject_id: self.subject_id,
                category_id: self.category_id,
            },
            is_active: self.is_active,
            is_repeatable: self.is_repeatable,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct UserPointsRow {
    user_id: Uuid,
    total_points: f64,
    current_level: i32,
    points_to_next_level: f64,
    tier: String,
    current_streak: i32,
    longest_streak: i32,
    last_activity_date: Option<NaiveDate>,
    lessons_points: f64,
    quizzes_points: f64,
    puzzles_points: f64,
    coding_points: f64,
    achievements_points: f64,
    bonuses_points: f64,
    badges_count: i32,
    achievements_count: i32,
    milestones_count: i32,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl UserPointsRow {
    fn to_domain(self) -> UserPointsRecord {
        UserPointsRecord {
            user_id: self.user_id,
            total_points: self.total_points,
            current_level: self.current_level.max(1) as u32,
            points_to_next_level: self.points_to_next_level,
            // Derived fields are refreshed by the engine on read.
            tier: Tier::parse(&self.tier).unwrap_or_default(),
            current_streak: self.current_streak.max(0) as u32,
            longest_streak: self.longest_streak.max(0) as u32,
            last_activity_date: self.last_activity_date,
            breakdown: PointsBreakdown {
                lessons: self.lessons_points,
                quizzes: self.quizzes_points,
                puzzles: self.puzzles_points,
                coding: self.coding_points,
                achievements: self.achievements_points,
                bonuses: self.bonuses_points,
            },
            reward_counts: RewardCounts {
                badges: self.badges_count.max(0) as u32,
                achievements: self.achievements_count.max(0) as u32,
                milestones: self.milestones_count.max(0) as u32,
            },
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct UserRewardRow {
    id: Uuid,
    user_id: Uuid,
    reward_id: Uuid,
    earned_at: DateTime<Utc>,
    times_earned: i32,
    metadata: Json<serde_json::Value>,
}
impl UserRewardRow {
    fn to_domain(self) -> UserRewardRecord {
        UserRewardRecord {
            id: self.id,
            user_id: self.user_id,
            reward_id: self.reward_id,
            earned_at: self.earned_at,
            times_earned: self.times_earned.max(1) as u32,
            metadata: self.metadata.0,
        }
    }
}

/// A user reward joined with its definition.
#[derive(FromRow)]
struct EarnedRewardRow {
    record_id: Uuid,
    user_id: Uuid,
    earned_at: DateTime<Utc>,
    times_earned: i32,
    metadata: Json<serde_json::Value>,
    #[sqlx(flatten)]
    reward: RewardRecord,
}
impl EarnedRewardRow {
    fn to_domain(self) -> PortResult<EarnedReward> {
        let reward = self.reward.to_domain()?;
        Ok(EarnedReward {
            record: UserRewardRecord {
                id: self.record_id,
                user_id: self.user_id,
                reward_id: reward.id,
                earned_at: self.earned_at,
                times_earned: self.times_earned.max(1) as u32,
                metadata: self.metadata.0,
            },
            reward,
        })
    }
}

//=========================================================================================
// Shared Statements
//=========================================================================================

/// Writes a points record if its version still matches, bumping the version.
async fn update_user_points<'e, E>(
    executor: E,
    record: &UserPointsRecord,
) -> PortResult<UserPointsRecord>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "UPDATE user_points SET total_points = $2, current_level = $3, points_to_next_level = $4, \
         tier = $5, current_streak = $6, longest_streak = $7, last_activity_date = $8, \
         lessons_points = $9, quizzes_points = $10, puzzles_points = $11, coding_points = $12, \
         achievements_points = $13, bonuses_points = $14, badges_count = $15, \
         achievements_count = $16, milestones_count = $17, updated_at = $18, version = version + 1 \
         WHERE user_id = $1 AND version = $19 RETURNING {USER_POINTS_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, UserPointsRow>(&sql)
        .bind(record.user_id)
        .bind(record.total_points)
        .bind(record.current_level as i32)
        .bind(record.points_to_next_level)
        .bind(record.tier.as_str())
        .bind(record.current_streak as i32)
        .bind(record.longest_streak as i32)
        .bind(record.last_activity_date)
        .bind(record.breakdown.lessons)
        .bind(record.breakdown.quizzes)
        .bind(record.breakdown.puzzles)
        .bind(record.breakdown.coding)
        .bind(record.breakdown.achievements)
        .bind(record.breakdown.bonuses)
        .bind(record.reward_counts.badges as i32)
        .bind(record.reward_counts.achievements as i32)
        .bind(record.reward_counts.milestones as i32)
        .bind(record.updated_at)
        .bind(record.version)
        .fetch_optional(executor)
        .await
        .map_err(write_error)?;

    updated.map(UserPointsRow::to_domain).ok_or_else(|| {
        PortError::Conflict(format!(
            "Points for user {} changed since version {}",
            record.user_id, record.version
        ))
    })
}

fn bind_reward<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    reward: &'q RewardDefinition,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(reward.id)
        .bind(&reward.name)
        .bind(&reward.description)
        .bind(reward.reward_type.as_str())
        .bind(&reward.category)
        .bind(&reward.icon)
        .bind(&reward.color)
        .bind(reward.points)
        .bind(reward.tier.as_str())
        .bind(reward.criteria.metric_type.as_str())
        .bind(reward.criteria.target)
        .bind(reward.criteria.subject_id)
        .bind(reward.criteria.category_id)
        .bind(reward.is_active)
        .bind(reward.is_repeatable)
        .bind(reward.created_at)
        .bind(reward.updated_at)
}

//=========================================================================================
// `GamificationStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl GamificationStore for DbAdapter {
    async fn get_user_points(&self, user_id: Uuid) -> PortResult<Option<UserPointsRecord>> {
        let sql = format!("SELECT {USER_POINTS_COLUMNS} FROM user_points WHERE user_id = $1");
        let record = sqlx::query_as::<_, UserPointsRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(UserPointsRow::to_domain))
    }

    async fn create_user_points_if_absent(
        &self,
        record: &UserPointsRecord,
    ) -> PortResult<UserPointsRecord> {
        sqlx::query(
            "INSERT INTO user_points (user_id, total_points, current_level, points_to_next_level, \
             tier, current_streak, longest_streak, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8, $9) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(record.user_id)
        .bind(record.total_points)
        .bind(record.current_level as i32)
        .bind(record.points_to_next_level)
        .bind(record.tier.as_str())
        .bind(record.current_streak as i32)
        .bind(record.longest_streak as i32)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        self.get_user_points(record.user_id).await?.ok_or_else(|| {
            PortError::Unexpected(format!("Points for user {} vanished after insert", record.user_id))
        })
    }

    async fn save_user_points(&self, record: &UserPointsRecord) -> PortResult<UserPointsRecord> {
        update_user_points(&self.pool, record).await
    }

    async fn list_user_points(&self) -> PortResult<Vec<UserPointsRecord>> {
        let sql = format!(
            "SELECT {USER_POINTS_COLUMNS} FROM user_points ORDER BY created_at ASC, user_id ASC"
        );
        let records = sqlx::query_as::<_, UserPointsRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(UserPointsRow::to_domain).collect())
    }

    async fn list_rewards(&self, filter: &RewardFilter) -> PortResult<Vec<RewardDefinition>> {
        let sql = format!(
            "SELECT {REWARD_COLUMNS} FROM reward_definitions \
             WHERE ($1::text IS NULL OR category = $1) \
             AND ($2::text IS NULL OR tier = $2) \
             AND (NOT $3 OR is_active) \
             ORDER BY created_at ASC, id ASC"
        );
        let records = sqlx::query_as::<_, RewardRecord>(&sql)
            .bind(filter.category.as_deref())
            .bind(filter.tier.map(|t| t.as_str()))
            .bind(filter.active_only)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(RewardRecord::to_domain).collect()
    }

    async fn get_reward(&self, reward_id: Uuid) -> PortResult<RewardDefinition> {
        let sql = format!("SELECT {REWARD_COLUMNS} FROM reward_definitions WHERE id = $1");
        let record = sqlx::query_as::<_, RewardRecord>(&sql)
            .bind(reward_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Reward {} not found", reward_id))
                }
                _ => unexpected(e),
            })?;
        record.to_domain()
    }

    async fn insert_reward(&self, reward: &RewardDefinition) -> PortResult<()> {
        let sql = format!(
            "INSERT INTO reward_definitions ({REWARD_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        );
        bind_reward(sqlx::query(&sql), reward)
            .execute(&self.pool)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn update_reward(&self, reward: &RewardDefinition) -> PortResult<()> {
        let result = bind_reward(
            sqlx::query(
                "UPDATE reward_definitions SET name = $2, description = $3, reward_type = $4, \
                 category = $5, icon = $6, color = $7, points = $8, tier = $9, metric_type = $10, \
                 target = $11, subject_id = $12, category_id = $13, is_active = $14, \
                 is_repeatable = $15, created_at = $16, updated_at = $17 WHERE id = $1",
            ),
            reward,
        )
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Reward {} not found", reward.id)));
        }
        Ok(())
    }

    async fn delete_reward(&self, reward_id: Uuid) -> PortResult<()> {
        // user_rewards rows go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM reward_definitions WHERE id = $1")
            .bind(reward_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Reward {} not found", reward_id)));
        }
        Ok(())
    }

    async fn list_user_rewards(&self, user_id: Uuid) -> PortResult<Vec<UserRewardRecord>> {
        let sql = format!(
            "SELECT {USER_REWARD_COLUMNS} FROM user_rewards WHERE user_id = $1 ORDER BY earned_at ASC"
        );
        let records = sqlx::query_as::<_, UserRewardRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(UserRewardRow::to_domain).collect())
    }

    async fn page_user_rewards(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> PortResult<(Vec<EarnedReward>, u64)> {
        let records = sqlx::query_as::<_, EarnedRewardRow>(
            "SELECT ur.id AS record_id, ur.user_id, ur.earned_at, ur.times_earned, ur.metadata, \
             rd.id, rd.name, rd.description, rd.reward_type, rd.category, rd.icon, rd.color, \
             rd.points, rd.tier, rd.metric_type, rd.target, rd.subject_id, rd.category_id, \
             rd.is_active, rd.is_repeatable, rd.created_at, rd.updated_at \
             FROM user_rewards ur JOIN reward_definitions rd ON rd.id = ur.reward_id \
             WHERE ur.user_id = $1 ORDER BY ur.earned_at DESC, ur.id ASC OFFSET $2 LIMIT $3",
        )
        .bind(user_id)
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_rewards WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        let items = records
            .into_iter()
            .map(EarnedRewardRow::to_domain)
            .collect::<PortResult<Vec<_>>>()?;
        Ok((items, total.max(0) as u64))
    }

    async fn commit_reward_grants(
        &self,
        record: &UserPointsRecord,
        grants: &[UserRewardRecord],
    ) -> PortResult<UserPointsRecord> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let saved = update_user_points(&mut *tx, record).await?;

        for grant in grants {
            sqlx::query(
                "INSERT INTO user_rewards (id, user_id, reward_id, earned_at, times_earned, metadata) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (id) DO UPDATE SET earned_at = EXCLUDED.earned_at, \
                 times_earned = EXCLUDED.times_earned, metadata = EXCLUDED.metadata",
            )
            .bind(grant.id)
            .bind(grant.user_id)
            .bind(grant.reward_id)
            .bind(grant.earned_at)
            .bind(grant.times_earned as i32)
            .bind(Json(&grant.metadata))
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;
        }

        // Dropping the transaction on any early return rolls everything back.
        tx.commit().await.map_err(unexpected)?;
        Ok(saved)
    }

    async fn load_point_values(&self) -> PortResult<Option<PointValues>> {
        let settings: Option<Json<PointValues>> =
            sqlx::query_scalar("SELECT settings FROM point_values WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(settings.map(|json| json.0))
    }

    async fn save_point_values(&self, values: &PointValues) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO point_values (id, settings, updated_at) VALUES (1, $1, NOW()) \
             ON CONFLICT (id) DO UPDATE SET settings = EXCLUDED.settings, updated_at = NOW()",
        )
        .bind(Json(values))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}
