//! crates/gamification_core/src/domain.rs
//!
//! Defines the core data structures of the gamification engine.
//! They serialize to plain JSON records; no storage concerns live here.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::levels;

//=========================================================================================
// Enumerations
//=========================================================================================

/// Rank band derived purely from a user's level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Tier {
    /// Maps a level to its tier, evaluated highest band first.
    pub fn for_level(level: u32) -> Self {
        match level {
            l if l >= 50 => Self::Diamond,
            l if l >= 30 => Self::Platinum,
            l if l >= 20 => Self::Gold,
            l if l >= 10 => Self::Silver,
            _ => Self::Bronze,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
            Self::Diamond => "diamond",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bronze" => Some(Self::Bronze),
            "silver" => Some(Self::Silver),
            "gold" => Some(Self::Gold),
            "platinum" => Some(Self::Platinum),
            "diamond" => Some(Self::Diamond),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    Badge,
    Achievement,
    Milestone,
    Streak,
    Completion,
    Performance,
}

impl RewardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Badge => "badge",
            Self::Achievement => "achievement",
            Self::Milestone => "milestone",
            Self::Streak => "streak",
            Self::Completion => "completion",
            Self::Performance => "performance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "badge" => Some(Self::Badge),
            "achievement" => Some(Self::Achievement),
            "milestone" => Some(Self::Milestone),
            "streak" => Some(Self::Streak),
            "completion" => Some(Self::Completion),
            "performance" => Some(Self::Performance),
            _ => None,
        }
    }
}

/// The aggregated statistic a reward's criteria is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    LessonsCompleted,
    QuizzesCompleted,
    CorrectAnswers,
    StreakDays,
    SubjectsEnrolled,
    AccuracyThreshold,
    PuzzlesSolved,
    CodingProblems,
    TimeSpent,
    PerfectScore,
    /// A metric name this build does not know. Rewards carrying it are skipped.
    #[serde(other)]
    Unrecognized,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LessonsCompleted => "lessons_completed",
            Self::QuizzesCompleted => "quizzes_completed",
            Self::CorrectAnswers => "correct_answers",
            Self::StreakDays => "streak_days",
            Self::SubjectsEnrolled => "subjects_enrolled",
            Self::AccuracyThreshold => "accuracy_threshold",
            Self::PuzzlesSolved => "puzzles_solved",
            Self::CodingProblems => "coding_problems",
            Self::TimeSpent => "time_spent",
            Self::PerfectScore => "perfect_score",
            Self::Unrecognized => "unrecognized",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "lessons_completed" => Self::LessonsCompleted,
            "quizzes_completed" => Self::QuizzesCompleted,
            "correct_answers" => Self::CorrectAnswers,
            "streak_days" => Self::StreakDays,
            "subjects_enrolled" => Self::SubjectsEnrolled,
            "accuracy_threshold" => Self::AccuracyThreshold,
            "puzzles_solved" => Self::PuzzlesSolved,
            "coding_problems" => Self::CodingProblems,
            "time_spent" => Self::TimeSpent,
            "perfect_score" => Self::PerfectScore,
            _ => Self::Unrecognized,
        }
    }
}

/// The kind of learning activity a collaborator reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    LessonCompleted,
    QuizCompleted,
    PuzzleSolved,
    CodingSolved,
    SubjectEnrolled,
    AchievementEarned,
    StreakBonus,
    #[serde(other)]
    Unknown,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LessonCompleted => "lesson_completed",
            Self::QuizCompleted => "quiz_completed",
            Self::PuzzleSolved => "puzzle_solved",
            Self::CodingSolved => "coding_solved",
            Self::SubjectEnrolled => "subject_enrolled",
            Self::AchievementEarned => "achievement_earned",
            Self::StreakBonus => "streak_bonus",
            Self::Unknown => "unknown",
        }
    }

    /// The breakdown category the activity's points accumulate into.
    pub fn bucket(&self) -> Option<BreakdownBucket> {
        match self {
            Self::LessonCompleted => Some(BreakdownBucket::Lessons),
            Self::QuizCompleted => Some(BreakdownBucket::Quizzes),
            Self::PuzzleSolved => Some(BreakdownBucket::Puzzles),
            Self::CodingSolved => Some(BreakdownBucket::Coding),
            Self::AchievementEarned => Some(BreakdownBucket::Achievements),
            Self::SubjectEnrolled | Self::StreakBonus => Some(BreakdownBucket::Bonuses),
            Self::Unknown => None,
        }
    }

    /// Activities only the engine itself awards; collaborators cannot report them.
    pub fn is_engine_issued(&self) -> bool {
        matches!(self, Self::AchievementEarned | Self::StreakBonus)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakdownBucket {
    Lessons,
    Quizzes,
    Puzzles,
    Coding,
    Achievements,
    Bonuses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Learner,
    Admin,
    /// A content service (lessons, quizzes, puzzles, coding, enrollment)
    /// reporting learner activity.
    Service,
}

//=========================================================================================
// Reward Definitions
//=========================================================================================

/// When a reward is satisfied: `metric >= target`, optionally scoped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Criteria {
    pub metric_type: MetricType,
    pub target: f64,
    #[serde(default)]
    pub subject_id: Option<Uuid>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
}

impl Criteria {
    pub fn scope(&self) -> StatsScope {
        StatsScope {
            subject_id: self.subject_id,
            category_id: self.category_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RewardDefinition {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub reward_type: RewardType,
    pub category: String,
    pub icon: String,
    pub color: String,
    /// Bonus points awarded each time the reward is granted.
    pub points: f64,
    pub tier: Tier,
    pub criteria: Criteria,
    pub is_active: bool,
    pub is_repeatable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a reward definition.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewReward {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub reward_type: RewardType,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub tier: Tier,
    pub criteria: Criteria,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_repeatable: bool,
}

fn default_color() -> String {
    "#ffd700".to_string()
}

fn default_true() -> bool {
    true
}

/// Partial update of a reward definition; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RewardPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub reward_type: Option<RewardType>,
    pub category: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub points: Option<f64>,
    pub tier: Option<Tier>,
    pub criteria: Option<Criteria>,
    pub is_active: Option<bool>,
    pub is_repeatable: Option<bool>,
}

/// Filter for listing reward definitions.
#[derive(Debug, Clone, Default)]
pub struct RewardFilter {
    pub category: Option<String>,
    pub tier: Option<Tier>,
    pub active_only: bool,
}

impl RewardFilter {
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, reward: &RewardDefinition) -> bool {
        (!self.active_only || reward.is_active)
            && self.category.as_ref().map_or(true, |c| &reward.category == c)
            && self.tier.map_or(true, |t| reward.tier == t)
    }
}

//=========================================================================================
// Per-user Aggregates
//=========================================================================================

/// Points accumulated per activity category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PointsBreakdown {
    pub lessons: f64,
    pub quizzes: f64,
    pub puzzles: f64,
    pub coding: f64,
    pub achievements: f64,
    pub bonuses: f64,
}

impl PointsBreakdown {
    pub fn bucket_mut(&mut self, bucket: BreakdownBucket) -> &mut f64 {
        match bucket {
            BreakdownBucket::Lessons => &mut self.lessons,
            BreakdownBucket::Quizzes => &mut self.quizzes,
            BreakdownBucket::Puzzles => &mut self.puzzles,
            BreakdownBucket::Coding => &mut self.coding,
            BreakdownBucket::Achievements => &mut self.achievements,
            BreakdownBucket::Bonuses => &mut self.bonuses,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RewardCounts {
    pub badges: u32,
    pub achievements: u32,
    pub milestones: u32,
}

impl RewardCounts {
    /// Badges and milestones have their own counters; every other type counts as an achievement.
    pub fn increment(&mut self, reward_type: RewardType) {
        match reward_type {
            RewardType::Badge => self.badges += 1,
            RewardType::Milestone => self.milestones += 1,
            _ => self.achievements += 1,
        }
    }
}

/// The persisted per-user ledger. `current_level`, `points_to_next_level` and
/// `tier` are always recomputed from `total_points`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserPointsRecord {
    pub user_id: Uuid,
    pub total_points: f64,
    pub current_level: u32,
    pub points_to_next_level: f64,
    pub tier: Tier,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub breakdown: PointsBreakdown,
    pub reward_counts: RewardCounts,
    /// Optimistic concurrency token, bumped by the store on every save.
    #[serde(skip)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserPointsRecord {
    /// A zero-initialized record for a user seen for the first time.
    pub fn new(user_id: Uuid, values: &PointValues, now: DateTime<Utc>) -> Self {
        let progress = levels::derive_level_tier(0.0, values);
        Self {
            user_id,
            total_points: 0.0,
            current_level: progress.level,
            points_to_next_level: progress.points_to_next_level,
            tier: progress.tier,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            breakdown: PointsBreakdown::default(),
            reward_counts: RewardCounts::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Recomputes level, tier and points-to-next-level from `total_points`.
    pub fn refresh_derived(&mut self, values: &PointValues) {
        let progress = levels::derive_level_tier(self.total_points, values);
        self.current_level = progress.level;
        self.points_to_next_level = progress.points_to_next_level;
        self.tier = progress.tier;
    }
}

/// A reward granted to a user. There is at most one per `(user_id, reward_id)`;
/// repeatable rewards bump `times_earned` instead of adding rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserRewardRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reward_id: Uuid,
    pub earned_at: DateTime<Utc>,
    pub times_earned: u32,
    /// Snapshot of the criteria and measured value at award time.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub metadata: serde_json::Value,
}

/// A user's reward record joined with its definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EarnedReward {
    pub record: UserRewardRecord,
    pub reward: RewardDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RewardPage {
    pub items: Vec<EarnedReward>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserRank {
    pub user_id: Uuid,
    pub rank: u64,
    pub percentile: i64,
    pub total_users: u64,
    pub total_points: f64,
}

//=========================================================================================
// Activity Events
//=========================================================================================

/// Metadata attached to an activity event. Every field is optional; the
/// calculator decides which ones an activity type needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct ActivityMetadata {
    #[serde(alias = "correctAnswers")]
    pub correct_answers: Option<f64>,
    #[serde(alias = "totalQuestions")]
    pub total_questions: Option<f64>,
    pub accuracy: Option<f64>,
    pub points: Option<f64>,
    #[serde(alias = "streakDays")]
    pub streak_days: Option<f64>,
}

impl ActivityMetadata {
    /// Reads metadata from an arbitrary JSON value. Anything unreadable is
    /// treated as empty metadata, which yields zero points downstream.
    pub fn from_value(value: serde_json::Value) -> Self {
        if value.is_null() {
            return Self::default();
        }
        serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed activity metadata: {}", e);
            Self::default()
        })
    }

    pub fn bonus(points: f64) -> Self {
        Self {
            points: Some(points),
            ..Self::default()
        }
    }
}

/// Result of a single `AwardPoints` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AwardOutcome {
    pub points_earned: f64,
    pub user_points: UserPointsRecord,
    pub level_up: bool,
    /// Rewards granted by the achievement pass that followed the award.
    pub rewards: Vec<UserRewardRecord>,
}

//=========================================================================================
// Collaborator Stats
//=========================================================================================

/// Optional subject/category restriction for aggregated stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StatsScope {
    pub subject_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
}

/// Aggregated learning stats read from the content collaborators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityStats {
    pub lessons_completed: u64,
    pub quizzes_completed: u64,
    pub correct_answers: u64,
    pub questions_answered: u64,
    pub perfect_quizzes: u64,
    pub subjects_enrolled: u64,
    pub puzzles_solved: u64,
    pub coding_problems_solved: u64,
    pub time_spent_minutes: f64,
}

impl ActivityStats {
    /// Answer accuracy as a percentage; zero when nothing was answered.
    pub fn accuracy(&self) -> f64 {
        if self.questions_answered == 0 {
            return 0.0;
        }
        self.correct_answers as f64 * 100.0 / self.questions_answered as f64
    }
}

/// The authenticated caller, as resolved by the token verifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether the caller may report activity on behalf of a learner.
    pub fn can_report_activity(&self) -> bool {
        matches!(self.role, Role::Service | Role::Admin)
    }
}

//=========================================================================================
// Rate Configuration
//=========================================================================================

/// Point rates and level curve parameters. Held by the engine as an immutable
/// snapshot and replaced wholesale on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct PointValues {
    pub lesson_completed: f64,
    pub quiz_correct: f64,
    pub quiz_wrong: f64,
    pub quiz_perfect_bonus: f64,
    pub puzzle_solved: f64,
    pub coding_base: f64,
    pub coding_perfect: f64,
    pub subject_enrolled: f64,
    pub streak_per_day: f64,
    /// Points needed to leave level 1.
    pub level_base_points: f64,
    /// Growth factor of each following level's threshold.
    pub level_scaling: f64,
}

impl Default for PointValues {
    fn default() -> Self {
        Self {
            lesson_completed: 1.0,
            quiz_correct: 0.5,
            quiz_wrong: 0.1,
            quiz_perfect_bonus: 2.0,
            puzzle_solved: 2.0,
            coding_base: 3.0,
            coding_perfect: 5.0,
            subject_enrolled: 1.0,
            streak_per_day: 0.5,
            level_base_points: 100.0,
            level_scaling: 1.5,
        }
    }
}

/// Partial update of the rate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PointValuesPatch {
    pub lesson_completed: Option<f64>,
    pub quiz_correct: Option<f64>,
    pub quiz_wrong: Option<f64>,
    pub quiz_perfect_bonus: Option<f64>,
    pub puzzle_solved: Option<f64>,
    pub coding_base: Option<f64>,
    pub coding_perfect: Option<f64>,
    pub subject_enrolled: Option<f64>,
    pub streak_per_day: Option<f64>,
    pub level_base_points: Option<f64>,
    pub level_scaling: Option<f64>,
}
