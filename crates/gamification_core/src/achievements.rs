//! Achievement evaluation.
//!
//! One pass works against a single stats snapshot: it decides every reward the
//! snapshot satisfies and hands the grants back for a batched commit. Granting
//! never re-enters evaluation.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{
    ActivityStats, Criteria, MetricType, RewardDefinition, StatsScope, UserRewardRecord,
};

/// A reward decided by an evaluation pass, with the record to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardGrant {
    pub reward: RewardDefinition,
    pub record: UserRewardRecord,
}

/// Stats gathered once per pass, keyed by the scope they were queried with.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub scoped: HashMap<StatsScope, ActivityStats>,
    pub current_streak: u32,
    /// First day of the running streak.
    pub streak_started: Option<NaiveDate>,
}

impl StatsSnapshot {
    /// The measured value for a criteria, or `None` if it cannot be measured.
    pub fn metric(&self, criteria: &Criteria) -> Option<f64> {
        if criteria.metric_type == MetricType::StreakDays {
            return Some(self.current_streak as f64);
        }
        let stats = self.scoped.get(&criteria.scope())?;
        let value = match criteria.metric_type {
            MetricType::LessonsCompleted => stats.lessons_completed as f64,
            MetricType::QuizzesCompleted => stats.quizzes_completed as f64,
            MetricType::CorrectAnswers => stats.correct_answers as f64,
            MetricType::SubjectsEnrolled => stats.subjects_enrolled as f64,
            MetricType::AccuracyThreshold => stats.accuracy(),
            MetricType::PuzzlesSolved => stats.puzzles_solved as f64,
            MetricType::CodingProblems => stats.coding_problems_solved as f64,
            MetricType::TimeSpent => stats.time_spent_minutes,
            MetricType::PerfectScore => stats.perfect_quizzes as f64,
            MetricType::StreakDays | MetricType::Unrecognized => return None,
        };
        Some(value)
    }

    /// Accuracy over the questions answered after the counts in `baseline`.
    /// `None` until at least one new question has been answered.
    fn accuracy_since(&self, criteria: &Criteria, baseline: &Value) -> Option<f64> {
        let stats = self.scoped.get(&criteria.scope())?;
        let correct_before = baseline.get("correct_answers")?.as_u64()?;
        let answered_before = baseline.get("questions_answered")?.as_u64()?;
        let answered = stats
            .questions_answered
            .checked_sub(answered_before)
            .filter(|n| *n > 0)?;
        let correct = stats.correct_answers.saturating_sub(correct_before).min(answered);
        Some(correct as f64 * 100.0 / answered as f64)
    }
}

/// Active rewards the user can still earn: never earned, or repeatable.
pub fn pending_rewards(
    rewards: Vec<RewardDefinition>,
    earned: &HashMap<Uuid, UserRewardRecord>,
) -> Vec<RewardDefinition> {
    rewards
        .into_iter()
        .filter(|r| r.is_active && (r.is_repeatable || !earned.contains_key(&r.id)))
        .collect()
}

/// The distinct stat scopes a set of rewards needs fetched.
pub fn required_scopes(rewards: &[RewardDefinition]) -> HashSet<StatsScope> {
    rewards
        .iter()
        .filter(|r| {
            !matches!(
                r.criteria.metric_type,
                MetricType::StreakDays | MetricType::Unrecognized
            )
        })
        .map(|r| r.criteria.scope())
        .collect()
}

/// Decides which rewards the snapshot satisfies.
///
/// A non-repeatable reward is granted once. How a repeatable reward becomes
/// due again depends on its metric:
/// - counters: earned `n` times, it needs the metric at `(n + 1) * target`;
/// - `accuracy_threshold`: the accuracy over questions answered since the
///   last grant must reach the target;
/// - `streak_days`: a streak other than the one last rewarded must reach the target.
pub fn evaluate_rewards(
    user_id: Uuid,
    rewards: &[RewardDefinition],
    earned: &HashMap<Uuid, UserRewardRecord>,
    snapshot: &StatsSnapshot,
    at: DateTime<Utc>,
) -> Vec<RewardGrant> {
    let mut grants = Vec::new();

    for reward in rewards.iter().filter(|r| r.is_active) {
        let existing = earned.get(&reward.id);
        if existing.is_some() && !reward.is_repeatable {
            continue;
        }

        let criteria = &reward.criteria;
        if criteria.metric_type == MetricType::Unrecognized {
            warn!("Skipping reward {} ({}): unknown metric type", reward.id, reward.name);
            continue;
        }
        if !criteria.target.is_finite() || criteria.target <= 0.0 {
            warn!(
                "Skipping reward {} ({}): invalid target {}",
                reward.id, reward.name, criteria.target
            );
            continue;
        }
        let Some(value) = snapshot.metric(criteria) else {
            debug!("No stats for reward {} scope {:?}", reward.id, criteria.scope());
            continue;
        };

        let measured = match existing {
            None => (value >= criteria.target).then_some(value),
            Some(prior) => repeat_value(criteria, value, prior, snapshot),
        };
        let Some(measured) = measured else {
            continue;
        };

        let metadata = grant_metadata(reward, measured, snapshot);
        let record = match existing {
            Some(prior) => UserRewardRecord {
                earned_at: at,
                times_earned: prior.times_earned + 1,
                metadata,
                ..prior.clone()
            },
            None => UserRewardRecord {
                id: Uuid::new_v4(),
                user_id,
                reward_id: reward.id,
                earned_at: at,
                times_earned: 1,
                metadata,
            },
        };
        grants.push(RewardGrant {
            reward: reward.clone(),
            record,
        });
    }

    grants
}

/// The value that makes an already earned repeatable reward due again.
fn repeat_value(
    criteria: &Criteria,
    value: f64,
    prior: &UserRewardRecord,
    snapshot: &StatsSnapshot,
) -> Option<f64> {
    match criteria.metric_type {
        MetricType::AccuracyThreshold => snapshot
            .accuracy_since(criteria, &prior.metadata)
            .filter(|accuracy| *accuracy >= criteria.target),
        MetricType::StreakDays => {
            let rewarded_streak = prior
                .metadata
                .get("streak_started")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<NaiveDate>().ok())?;
            let current = snapshot.streak_started?;
            (current != rewarded_streak && value >= criteria.target).then_some(value)
        }
        _ => {
            let required = criteria.target * f64::from(prior.times_earned + 1);
            (value >= required).then_some(value)
        }
    }
}

/// Snapshot stored with a grant; carries the baseline the next repeat is measured from.
fn grant_metadata(reward: &RewardDefinition, measured: f64, snapshot: &StatsSnapshot) -> Value {
    let criteria = &reward.criteria;
    let mut metadata = json!({
        "reward_name": reward.name,
        "metric_type": criteria.metric_type.as_str(),
        "target": criteria.target,
        "value": measured,
        "points": reward.points,
    });
    match criteria.metric_type {
        MetricType::AccuracyThreshold => {
            if let Some(stats) = snapshot.scoped.get(&criteria.scope()) {
                metadata["correct_answers"] = json!(stats.correct_answers);
                metadata["questions_answered"] = json!(stats.questions_answered);
            }
        }
        MetricType::StreakDays => {
            if let Some(started) = snapshot.streak_started {
                metadata["streak_started"] = json!(started.to_string());
            }
        }
        _ => {}
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RewardType, Tier};

    fn reward(metric: MetricType, target: f64, repeatable: bool) -> RewardDefinition {
        let now = Utc::now();
        RewardDefinition {
            id: Uuid::new_v4(),
            name: format!("{} {}", metric.as_str(), target),
            description: String::new(),
            reward_type: RewardType::Achievement,
            category: "learning".to_string(),
            icon: "star".to_string(),
            color: "#ffd700".to_string(),
            points: 10.0,
            tier: Tier::Bronze,
            criteria: Criteria {
                metric_type: metric,
                target,
                subject_id: None,
                category_id: None,
            },
            is_active: true,
            is_repeatable: repeatable,
            created_at: now,
            updated_at: now,
        }
    }

    fn snapshot(stats: ActivityStats, streak: u32) -> StatsSnapshot {
        StatsSnapshot {
            scoped: HashMap::from([(StatsScope::default(), stats)]),
            current_streak: streak,
            streak_started: None,
        }
    }

    fn answered(correct: u64, total: u64) -> ActivityStats {
        ActivityStats {
            correct_answers: correct,
            questions_answered: total,
            ..ActivityStats::default()
        }
    }

    #[test]
    fn grants_satisfied_rewards_only() {
        let user = Uuid::new_v4();
        let rewards = vec![
            reward(MetricType::LessonsCompleted, 1.0, false),
            reward(MetricType::LessonsCompleted, 10.0, false),
            reward(MetricType::StreakDays, 3.0, false),
        ];
        let stats = ActivityStats {
            lessons_completed: 4,
            ..ActivityStats::default()
        };

        let grants = evaluate_rewards(user, &rewards, &HashMap::new(), &snapshot(stats, 3), Utc::now());

        let granted: Vec<Uuid> = grants.iter().map(|g| g.reward.id).collect();
        assert_eq!(granted, vec![rewards[0].id, rewards[2].id]);
        assert!(grants.iter().all(|g| g.record.times_earned == 1 && g.record.user_id == user));
    }

    #[test]
    fn earned_non_repeatable_is_skipped() {
        let user = Uuid::new_v4();
        let rewards = vec![reward(MetricType::LessonsCompleted, 1.0, false)];
        let stats = ActivityStats {
            lessons_completed: 5,
            ..ActivityStats::default()
        };
        let first = evaluate_rewards(user, &rewards, &HashMap::new(), &snapshot(stats.clone(), 0), Utc::now());
        let earned = HashMap::from([(rewards[0].id, first[0].record.clone())]);

        let second = evaluate_rewards(user, &rewards, &earned, &snapshot(stats, 0), Utc::now());
        assert!(second.is_empty());
    }

    #[test]
    fn repeatable_waits_for_next_multiple() {
        let user = Uuid::new_v4();
        let rewards = vec![reward(MetricType::PuzzlesSolved, 5.0, true)];
        let stats = |n| ActivityStats {
            puzzles_solved: n,
            ..ActivityStats::default()
        };

        let first = evaluate_rewards(user, &rewards, &HashMap::new(), &snapshot(stats(7), 0), Utc::now());
        assert_eq!(first.len(), 1);
        let earned = HashMap::from([(rewards[0].id, first[0].record.clone())]);

        assert!(evaluate_rewards(user, &rewards, &earned, &snapshot(stats(9), 0), Utc::now()).is_empty());

        let again = evaluate_rewards(user, &rewards, &earned, &snapshot(stats(10), 0), Utc::now());
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].record.times_earned, 2);
        assert_eq!(again[0].record.id, first[0].record.id);
    }

    #[test]
    fn misconfigured_rewards_do_not_block_others() {
        let user = Uuid::new_v4();
        let rewards = vec![
            reward(MetricType::Unrecognized, 1.0, false),
            reward(MetricType::CorrectAnswers, 0.0, false),
            reward(MetricType::CorrectAnswers, 3.0, false),
        ];
        let stats = ActivityStats {
            correct_answers: 3,
            ..ActivityStats::default()
        };

        let grants = evaluate_rewards(user, &rewards, &HashMap::new(), &snapshot(stats, 0), Utc::now());
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].reward.id, rewards[2].id);
    }

    #[test]
    fn accuracy_uses_answered_questions() {
        let criteria = Criteria {
            metric_type: MetricType::AccuracyThreshold,
            target: 80.0,
            subject_id: None,
            category_id: None,
        };
        let snap = snapshot(
            ActivityStats {
                correct_answers: 9,
                questions_answered: 10,
                ..ActivityStats::default()
            },
            0,
        );
        assert_eq!(snap.metric(&criteria), Some(90.0));
        assert_eq!(snapshot(ActivityStats::default(), 0).metric(&criteria), Some(0.0));
    }

    #[test]
    fn scopes_skip_streak_and_unknown_metrics() {
        let subject = Uuid::new_v4();
        let mut scoped = reward(MetricType::LessonsCompleted, 1.0, false);
        scoped.criteria.subject_id = Some(subject);
        let rewards = vec![
            scoped,
            reward(MetricType::QuizzesCompleted, 1.0, false),
            reward(MetricType::StreakDays, 2.0, false),
            reward(MetricType::Unrecognized, 2.0, false),
        ];

        let scopes = required_scopes(&rewards);
        assert_eq!(scopes.len(), 2);
        assert!(scopes.contains(&StatsScope {
            subject_id: Some(subject),
            category_id: None
        }));
        assert!(scopes.contains(&StatsScope::default()));
    }

    #[test]
    fn repeatable_accuracy_regrants_on_new_answers() {
        let user = Uuid::new_v4();
        let rewards = vec![reward(MetricType::AccuracyThreshold, 80.0, true)];

        let first = evaluate_rewards(user, &rewards, &HashMap::new(), &snapshot(answered(10, 10), 0), Utc::now());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].record.metadata["questions_answered"], json!(10));
        let earned = HashMap::from([(rewards[0].id, first[0].record.clone())]);

        // Nothing answered since the grant.
        assert!(evaluate_rewards(user, &rewards, &earned, &snapshot(answered(10, 10), 0), Utc::now()).is_empty());
        // 3 of 5 new answers is 60%.
        assert!(evaluate_rewards(user, &rewards, &earned, &snapshot(answered(13, 15), 0), Utc::now()).is_empty());

        let again = evaluate_rewards(user, &rewards, &earned, &snapshot(answered(14, 15), 0), Utc::now());
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].record.times_earned, 2);
        assert_eq!(again[0].record.metadata["value"], json!(80.0));
        assert_eq!(again[0].record.metadata["questions_answered"], json!(15));
    }

    #[test]
    fn repeatable_streak_regrants_for_a_new_streak() {
        let user = Uuid::new_v4();
        let rewards = vec![reward(MetricType::StreakDays, 7.0, true)];
        let june = |d| NaiveDate::from_ymd_opt(2024, 6, d).unwrap();
        let streak = |days, started| StatsSnapshot {
            scoped: HashMap::new(),
            current_streak: days,
            streak_started: Some(started),
        };

        let first = evaluate_rewards(user, &rewards, &HashMap::new(), &streak(7, june(1)), Utc::now());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].record.metadata["streak_started"], json!("2024-06-01"));
        let earned = HashMap::from([(rewards[0].id, first[0].record.clone())]);

        // The same streak keeps going.
        assert!(evaluate_rewards(user, &rewards, &earned, &streak(14, june(1)), Utc::now()).is_empty());
        // A new streak that is still short.
        assert!(evaluate_rewards(user, &rewards, &earned, &streak(3, june(20)), Utc::now()).is_empty());

        let again = evaluate_rewards(user, &rewards, &earned, &streak(7, june(20)), Utc::now());
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].record.times_earned, 2);
    }
}
