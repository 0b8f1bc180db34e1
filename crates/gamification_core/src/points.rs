//! Points calculation for activity events, plus validation of the rate table.

use tracing::warn;

use crate::domain::{ActivityMetadata, ActivityType, PointValues, PointValuesPatch};
use crate::levels::round2;
use crate::ports::{PortError, PortResult};

/// Computes the non-negative point delta for one activity event.
///
/// Missing or malformed metadata never fails the call: it is logged and the
/// event is worth zero points.
pub fn calculate_points(
    activity: ActivityType,
    metadata: &ActivityMetadata,
    values: &PointValues,
) -> f64 {
    let points = match activity {
        ActivityType::LessonCompleted => Some(values.lesson_completed),
        ActivityType::QuizCompleted => quiz_points(metadata, values),
        ActivityType::PuzzleSolved => Some(values.puzzle_solved),
        ActivityType::CodingSolved => coding_points(metadata, values),
        ActivityType::SubjectEnrolled => Some(values.subject_enrolled),
        ActivityType::AchievementEarned => count(metadata.points),
        ActivityType::StreakBonus => count(metadata.streak_days).map(|d| d * values.streak_per_day),
        ActivityType::Unknown => None,
    };

    match points {
        Some(p) if p.is_finite() && p >= 0.0 => round2(p),
        _ => {
            warn!(
                "No points for {} activity: missing or malformed metadata {:?}",
                activity.as_str(),
                metadata
            );
            0.0
        }
    }
}

fn quiz_points(metadata: &ActivityMetadata, values: &PointValues) -> Option<f64> {
    let correct = count(metadata.correct_answers)?;
    let total = count(metadata.total_questions)?;
    if correct > total {
        return None;
    }

    let mut points = correct * values.quiz_correct + (total - correct) * values.quiz_wrong;
    if correct == total && total >= 2.0 {
        points += values.quiz_perfect_bonus;
    }
    Some(points)
}

fn coding_points(metadata: &ActivityMetadata, values: &PointValues) -> Option<f64> {
    match metadata.accuracy {
        None => Some(values.coding_base),
        Some(a) if !(0.0..=100.0).contains(&a) => None,
        Some(a) if a == 100.0 => Some(values.coding_perfect),
        Some(_) => Some(values.coding_base),
    }
}

/// A present, finite, non-negative number.
fn count(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

/// Smallest first-level threshold that survives truncation to two decimals.
pub const MIN_LEVEL_BASE_POINTS: f64 = 0.01;

impl PointValues {
    /// Checks every rate is a finite non-negative number and the level curve grows.
    pub fn validate(&self) -> PortResult<()> {
        let rates = [
            ("lesson_completed", self.lesson_completed),
            ("quiz_correct", self.quiz_correct),
            ("quiz_wrong", self.quiz_wrong),
            ("quiz_perfect_bonus", self.quiz_perfect_bonus),
            ("puzzle_solved", self.puzzle_solved),
            ("coding_base", self.coding_base),
            ("coding_perfect", self.coding_perfect),
            ("subject_enrolled", self.subject_enrolled),
            ("streak_per_day", self.streak_per_day),
        ];
        for (name, rate) in rates {
            if !rate.is_finite() || rate < 0.0 {
                return Err(PortError::Invalid(format!(
                    "{} must be a non-negative number, got {}",
                    name, rate
                )));
            }
        }
        // Thresholds are truncated to cents; anything smaller would be a zero threshold.
        if !self.level_base_points.is_finite() || self.level_base_points < MIN_LEVEL_BASE_POINTS {
            return Err(PortError::Invalid(format!(
                "level_base_points must be at least {}",
                MIN_LEVEL_BASE_POINTS
            )));
        }
        if !self.level_scaling.is_finite() || self.level_scaling < 1.0 {
            return Err(PortError::Invalid(
                "level_scaling must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns a copy with the patch's present fields applied.
    pub fn merged(&self, patch: &PointValuesPatch) -> Self {
        Self {
            lesson_completed: patch.lesson_completed.unwrap_or(self.lesson_completed),
            quiz_correct: patch.quiz_correct.unwrap_or(self.quiz_correct),
            quiz_wrong: patch.quiz_wrong.unwrap_or(self.quiz_wrong),
            quiz_perfect_bonus: patch.quiz_perfect_bonus.unwrap_or(self.quiz_perfect_bonus),
            puzzle_solved: patch.puzzle_solved.unwrap_or(self.puzzle_solved),
            coding_base: patch.coding_base.unwrap_or(self.coding_base),
            coding_perfect: patch.coding_perfect.unwrap_or(self.coding_perfect),
            subject_enrolled: patch.subject_enrolled.unwrap_or(self.subject_enrolled),
            streak_per_day: patch.streak_per_day.unwrap_or(self.streak_per_day),
            level_base_points: patch.level_base_points.unwrap_or(self.level_base_points),
            level_scaling: patch.level_scaling.unwrap_or(self.level_scaling),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(correct: f64, total: f64) -> ActivityMetadata {
        ActivityMetadata {
            correct_answers: Some(correct),
            total_questions: Some(total),
            ..ActivityMetadata::default()
        }
    }

    #[test]
    fn flat_rate_activities() {
        let v = PointValues::default();
        let none = ActivityMetadata::default();
        assert_eq!(calculate_points(ActivityType::LessonCompleted, &none, &v), 1.0);
        assert_eq!(calculate_points(ActivityType::PuzzleSolved, &none, &v), 2.0);
        assert_eq!(calculate_points(ActivityType::SubjectEnrolled, &none, &v), 1.0);
    }

    #[test]
    fn perfect_quiz_earns_bonus() {
        let v = PointValues::default();
        assert_eq!(calculate_points(ActivityType::QuizCompleted, &quiz(5.0, 5.0), &v), 4.5);
    }

    #[test]
    fn imperfect_quiz_counts_wrong_answers() {
        let v = PointValues::default();
        // 3 * 0.5 + 2 * 0.1
        assert_eq!(calculate_points(ActivityType::QuizCompleted, &quiz(3.0, 5.0), &v), 1.7);
    }

    #[test]
    fn single_question_quiz_gets_no_perfect_bonus() {
        let v = PointValues::default();
        assert_eq!(calculate_points(ActivityType::QuizCompleted, &quiz(1.0, 1.0), &v), 0.5);
    }

    #[test]
    fn malformed_quiz_is_worth_nothing() {
        let v = PointValues::default();
        let missing = ActivityMetadata::default();
        assert_eq!(calculate_points(ActivityType::QuizCompleted, &missing, &v), 0.0);
        assert_eq!(calculate_points(ActivityType::QuizCompleted, &quiz(6.0, 5.0), &v), 0.0);
        assert_eq!(calculate_points(ActivityType::QuizCompleted, &quiz(-1.0, 5.0), &v), 0.0);
    }

    #[test]
    fn coding_rewards_perfect_accuracy() {
        let v = PointValues::default();
        let with = |accuracy: Option<f64>| ActivityMetadata {
            accuracy,
            ..ActivityMetadata::default()
        };
        assert_eq!(calculate_points(ActivityType::CodingSolved, &with(Some(100.0)), &v), 5.0);
        assert_eq!(calculate_points(ActivityType::CodingSolved, &with(Some(80.0)), &v), 3.0);
        assert_eq!(calculate_points(ActivityType::CodingSolved, &with(None), &v), 3.0);
        assert_eq!(calculate_points(ActivityType::CodingSolved, &with(Some(140.0)), &v), 0.0);
    }

    #[test]
    fn bonus_activities_use_metadata() {
        let v = PointValues::default();
        assert_eq!(
            calculate_points(ActivityType::AchievementEarned, &ActivityMetadata::bonus(25.0), &v),
            25.0
        );
        let streak = ActivityMetadata {
            streak_days: Some(7.0),
            ..ActivityMetadata::default()
        };
        assert_eq!(calculate_points(ActivityType::StreakBonus, &streak, &v), 3.5);
        assert_eq!(
            calculate_points(ActivityType::StreakBonus, &ActivityMetadata::default(), &v),
            0.0
        );
    }

    #[test]
    fn unknown_activity_is_worth_nothing() {
        let v = PointValues::default();
        assert_eq!(
            calculate_points(ActivityType::Unknown, &ActivityMetadata::default(), &v),
            0.0
        );
    }

    #[test]
    fn metadata_accepts_camel_case_keys() {
        let meta = ActivityMetadata::from_value(serde_json::json!({
            "correctAnswers": 4,
            "totalQuestions": 5
        }));
        assert_eq!(meta.correct_answers, Some(4.0));
        assert_eq!(meta.total_questions, Some(5.0));

        let garbage = ActivityMetadata::from_value(serde_json::json!({ "correct_answers": "many" }));
        assert_eq!(garbage, ActivityMetadata::default());
    }

    #[test]
    fn rates_are_validated_after_merge() {
        let base = PointValues::default();
        let patch = PointValuesPatch {
            lesson_completed: Some(3.0),
            ..PointValuesPatch::default()
        };
        let merged = base.merged(&patch);
        assert_eq!(merged.lesson_completed, 3.0);
        assert_eq!(merged.quiz_correct, base.quiz_correct);
        assert!(merged.validate().is_ok());

        let negative = base.merged(&PointValuesPatch {
            quiz_wrong: Some(-1.0),
            ..PointValuesPatch::default()
        });
        assert!(matches!(negative.validate(), Err(PortError::Invalid(_))));

        let shrinking = base.merged(&PointValuesPatch {
            level_scaling: Some(0.5),
            ..PointValuesPatch::default()
        });
        assert!(matches!(shrinking.validate(), Err(PortError::Invalid(_))));
    }

    #[test]
    fn level_base_must_survive_truncation() {
        let base = |points| PointValues {
            level_base_points: points,
            ..PointValues::default()
        };
        assert!(matches!(base(0.005).validate(), Err(PortError::Invalid(_))));
        assert!(matches!(base(0.0).validate(), Err(PortError::Invalid(_))));
        assert!(base(MIN_LEVEL_BASE_POINTS).validate().is_ok());

        let smallest = base(MIN_LEVEL_BASE_POINTS);
        let progress = crate::levels::derive_level_tier(0.0, &smallest);
        assert_eq!(progress.level, 1);
        assert_eq!(progress.points_to_next_level, 0.01);
    }
}
