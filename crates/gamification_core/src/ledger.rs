//! Pure mutations of a user's points record.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::achievements::RewardGrant;
use crate::domain::{ActivityMetadata, ActivityType, BreakdownBucket, PointValues, UserPointsRecord};
use crate::levels::round2;
use crate::points::calculate_points;
use crate::streaks::{advance_streak, StreakState, StreakTransition};

/// Adds `points` to the record, advances the streak for `at`, and recomputes
/// the derived level fields.
pub fn apply_points(
    record: &mut UserPointsRecord,
    bucket: Option<BreakdownBucket>,
    points: f64,
    at: DateTime<Utc>,
    values: &PointValues,
) {
    let points = points.max(0.0);
    record.total_points = round2(record.total_points + points);
    if let Some(bucket) = bucket {
        let slot = record.breakdown.bucket_mut(bucket);
        *slot = round2(*slot + points);
    }

    let (streak, transition) = advance_streak(
        StreakState {
            current_streak: record.current_streak,
            longest_streak: record.longest_streak,
            last_activity_date: record.last_activity_date,
        },
        at.date_naive(),
    );
    if transition == StreakTransition::Backdated {
        debug!(
            "Ignoring backdated activity at {} for user {} (last activity {:?})",
            at, record.user_id, record.last_activity_date
        );
    }
    record.current_streak = streak.current_streak;
    record.longest_streak = streak.longest_streak;
    record.last_activity_date = streak.last_activity_date;

    record.refresh_derived(values);
    record.updated_at = record.updated_at.max(at);
}

/// Applies a batch of reward grants: bumps the reward counters and adds each
/// reward's bonus as an `achievement_earned` award. Returns the bonus total.
pub fn apply_reward_grants(
    record: &mut UserPointsRecord,
    grants: &[RewardGrant],
    at: DateTime<Utc>,
    values: &PointValues,
) -> f64 {
    let mut bonus = 0.0;
    for grant in grants {
        record.reward_counts.increment(grant.reward.reward_type);
        bonus += calculate_points(
            ActivityType::AchievementEarned,
            &ActivityMetadata::bonus(grant.reward.points),
            values,
        );
    }
    apply_points(
        record,
        ActivityType::AchievementEarned.bucket(),
        bonus,
        at,
        values,
    );
    round2(bonus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn points_land_in_total_and_bucket() {
        let values = PointValues::default();
        let mut record = UserPointsRecord::new(Uuid::new_v4(), &values, at(1, 8));

        apply_points(&mut record, Some(BreakdownBucket::Quizzes), 4.5, at(1, 9), &values);
        apply_points(&mut record, Some(BreakdownBucket::Lessons), 1.0, at(1, 10), &values);

        assert_eq!(record.total_points, 5.5);
        assert_eq!(record.breakdown.quizzes, 4.5);
        assert_eq!(record.breakdown.lessons, 1.0);
        assert_eq!(record.current_streak, 1);
        assert_eq!(record.updated_at, at(1, 10));
    }

    #[test]
    fn derived_fields_track_total() {
        let values = PointValues::default();
        let mut record = UserPointsRecord::new(Uuid::new_v4(), &values, at(1, 8));

        apply_points(&mut record, Some(BreakdownBucket::Bonuses), 120.0, at(1, 9), &values);

        assert_eq!(record.current_level, 2);
        assert_eq!(record.points_to_next_level, 130.0);
    }

    #[test]
    fn backdated_award_still_counts_points() {
        let values = PointValues::default();
        let mut record = UserPointsRecord::new(Uuid::new_v4(), &values, at(1, 8));
        apply_points(&mut record, None, 1.0, at(10, 9), &values);
        apply_points(&mut record, None, 1.0, at(3, 9), &values);

        assert_eq!(record.total_points, 2.0);
        assert_eq!(record.current_streak, 1);
        assert_eq!(record.last_activity_date, Some(at(10, 9).date_naive()));
    }
}
