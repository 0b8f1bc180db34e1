//! services/api/src/adapters/stats.rs
//!
//! Aggregates a learner's activity from the content tables owned by the
//! lesson, quiz, subject, puzzle and coding services.

use async_trait::async_trait;
use gamification_core::domain::{ActivityStats, StatsScope};
use gamification_core::ports::{ActivityStatsService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Implements `ActivityStatsService` with one aggregate query per call.
#[derive(Clone)]
pub struct PgStatsAdapter {
    pool: PgPool,
}

impl PgStatsAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Each subquery applies the same optional subject and category filter.
const STATS_QUERY: &str = "
WITH scope AS (SELECT $1::uuid AS user_id, $2::uuid AS subject_id, $3::uuid AS category_id),
lessons AS (
    SELECT COUNT(DISTINCT lc.lesson_id) AS completed,
           COALESCE(SUM(lc.time_spent_minutes), 0)::float8 AS minutes
    FROM lesson_completions lc, scope s
    WHERE lc.user_id = s.user_id
      AND (s.subject_id IS NULL OR lc.subject_id = s.subject_id)
      AND (s.category_id IS NULL OR lc.category_id = s.category_id)
),
quizzes AS (
    SELECT COUNT(*) AS completed,
           COALESCE(SUM(qa.correct_answers), 0)::int8 AS correct,
           COALESCE(SUM(qa.total_questions), 0)::int8 AS answered,
           COUNT(*) FILTER (WHERE qa.total_questions > 0 AND qa.correct_answers = qa.total_questions) AS perfect
    FROM quiz_attempts qa, scope s
    WHERE qa.user_id = s.user_id
      AND (s.subject_id IS NULL OR qa.subject_id = s.subject_id)
      AND (s.category_id IS NULL OR qa.category_id = s.category_id)
),
enrollments AS (
    SELECT COUNT(*) AS enrolled
    FROM subject_enrollments se, scope s
    WHERE se.user_id = s.user_id
      AND (s.subject_id IS NULL OR se.subject_id = s.subject_id)
      AND (s.category_id IS NULL OR se.category_id = s.category_id)
),
puzzles AS (
    SELECT COUNT(DISTINCT pa.puzzle_id) FILTER (WHERE pa.solved) AS solved
    FROM puzzle_attempts pa, scope s
    WHERE pa.user_id = s.user_id
      AND (s.subject_id IS NULL OR pa.subject_id = s.subject_id)
      AND (s.category_id IS NULL OR pa.category_id = s.category_id)
),
coding AS (
    SELECT COUNT(DISTINCT cs.problem_id) FILTER (WHERE cs.solved) AS solved
    FROM coding_submissions cs, scope s
    WHERE cs.user_id = s.user_id
      AND (s.subject_id IS NULL OR cs.subject_id = s.subject_id)
      AND (s.category_id IS NULL OR cs.category_id = s.category_id)
)
SELECT lessons.completed AS lessons_completed,
       lessons.minutes AS time_spent_minutes,
       quizzes.completed AS quizzes_completed,
       quizzes.correct AS correct_answers,
       quizzes.answered AS questions_answered,
       quizzes.perfect AS perfect_quizzes,
       enrollments.enrolled AS subjects_enrolled,
       puzzles.solved AS puzzles_solved,
       coding.solved AS coding_problems_solved
FROM lessons, quizzes, enrollments, puzzles, coding";

#[derive(FromRow)]
struct StatsRow {
    lessons_completed: i64,
    time_spent_minutes: f64,
    quizzes_completed: i64,
    correct_answers: i64,
    questions_answered: i64,
    perfect_quizzes: i64,
    subjects_enrolled: i64,
    puzzles_solved: i64,
    coding_problems_solved: i64,
}
impl StatsRow {
    fn to_domain(self) -> ActivityStats {
        let count = |n: i64| n.max(0) as u64;
        ActivityStats {
            lessons_completed: count(self.lessons_completed),
            quizzes_completed: count(self.quizzes_completed),
            correct_answers: count(self.correct_answers),
            questions_answered: count(self.questions_answered),
            perfect_quizzes: count(self.perfect_quizzes),
            subjects_enrolled: count(self.subjects_enrolled),
            puzzles_solved: count(self.puzzles_solved),
            coding_problems_solved: count(self.coding_problems_solved),
            time_spent_minutes: self.time_spent_minutes.max(0.0),
        }
    }
}

#[async_trait]
impl ActivityStatsService for PgStatsAdapter {
    async fn user_stats(&self, user_id: Uuid, scope: &StatsScope) -> PortResult<ActivityStats> {
        let row = sqlx::query_as::<_, StatsRow>(STATS_QUERY)
            .bind(user_id)
            .bind(scope.subject_id)
            .bind(scope.category_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(format!("activity stats: {}", e)))?;
        Ok(row.to_domain())
    }
}
