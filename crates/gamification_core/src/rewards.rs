//! Construction and validation of reward definitions.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::domain::{MetricType, NewReward, RewardDefinition, RewardPatch};
use crate::ports::{PortError, PortResult};

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("static color pattern is valid")
    })
}

impl RewardDefinition {
    pub fn from_new(new: NewReward, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            description: new.description,
            reward_type: new.reward_type,
            category: new.category,
            icon: new.icon,
            color: new.color,
            points: new.points,
            tier: new.tier,
            criteria: new.criteria,
            is_active: new.is_active,
            is_repeatable: new.is_repeatable,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns a copy with the patch's present fields applied.
    pub fn patched(&self, patch: RewardPatch, now: DateTime<Utc>) -> Self {
        Self {
            id: self.id,
            name: patch.name.map_or_else(|| self.name.clone(), |n| n.trim().to_string()),
            description: patch.description.unwrap_or_else(|| self.description.clone()),
            reward_type: patch.reward_type.unwrap_or(self.reward_type),
            category: patch.category.unwrap_or_else(|| self.category.clone()),
            icon: patch.icon.unwrap_or_else(|| self.icon.clone()),
            color: patch.color.unwrap_or_else(|| self.color.clone()),
            points: patch.points.unwrap_or(self.points),
            tier: patch.tier.unwrap_or(self.tier),
            criteria: patch.criteria.unwrap_or_else(|| self.criteria.clone()),
            is_active: patch.is_active.unwrap_or(self.is_active),
            is_repeatable: patch.is_repeatable.unwrap_or(self.is_repeatable),
            created_at: self.created_at,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> PortResult<()> {
        if self.name.is_empty() {
            return Err(PortError::Invalid("reward name must not be empty".to_string()));
        }
        if !color_pattern().is_match(&self.color) {
            return Err(PortError::Invalid(format!(
                "color '{}' is not a #RGB or #RRGGBB value",
                self.color
            )));
        }
        if !self.points.is_finite() || self.points < 0.0 {
            return Err(PortError::Invalid(
                "reward points must be a non-negative number".to_string(),
            ));
        }
        if self.criteria.metric_type == MetricType::Unrecognized {
            return Err(PortError::Invalid("unknown criteria metric type".to_string()));
        }
        if !self.criteria.target.is_finite() || self.criteria.target <= 0.0 {
            return Err(PortError::Invalid(
                "criteria target must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Criteria, RewardType, Tier};

    fn new_reward() -> NewReward {
        NewReward {
            name: "  First Steps ".to_string(),
            description: "Complete a lesson".to_string(),
            reward_type: RewardType::Badge,
            category: "lessons".to_string(),
            icon: "footprints".to_string(),
            color: "#1e90ff".to_string(),
            points: 5.0,
            tier: Tier::Bronze,
            criteria: Criteria {
                metric_type: MetricType::LessonsCompleted,
                target: 1.0,
                subject_id: None,
                category_id: None,
            },
            is_active: true,
            is_repeatable: false,
        }
    }

    #[test]
    fn new_reward_is_trimmed_and_valid() {
        let reward = RewardDefinition::from_new(new_reward(), Utc::now());
        assert_eq!(reward.name, "First Steps");
        assert!(reward.validate().is_ok());
    }

    #[test]
    fn rejects_bad_fields() {
        let now = Utc::now();
        let base = RewardDefinition::from_new(new_reward(), now);

        let cases = [
            RewardPatch { name: Some("   ".to_string()), ..RewardPatch::default() },
            RewardPatch { color: Some("gold".to_string()), ..RewardPatch::default() },
            RewardPatch { points: Some(-1.0), ..RewardPatch::default() },
            RewardPatch {
                criteria: Some(Criteria { target: 0.0, ..base.criteria.clone() }),
                ..RewardPatch::default()
            },
            RewardPatch {
                criteria: Some(Criteria {
                    metric_type: MetricType::Unrecognized,
                    ..base.criteria.clone()
                }),
                ..RewardPatch::default()
            },
        ];
        for patch in cases {
            assert!(matches!(base.patched(patch, now).validate(), Err(PortError::Invalid(_))));
        }
    }

    #[test]
    fn patch_keeps_untouched_fields() {
        let created = Utc::now();
        let base = RewardDefinition::from_new(new_reward(), created);
        let later = created + chrono::Duration::minutes(5);

        let patched = base.patched(
            RewardPatch {
                points: Some(20.0),
                color: Some("#FFF".to_string()),
                ..RewardPatch::default()
            },
            later,
        );

        assert_eq!(patched.points, 20.0);
        assert_eq!(patched.color, "#FFF");
        assert_eq!(patched.name, base.name);
        assert_eq!(patched.created_at, created);
        assert_eq!(patched.updated_at, later);
        assert!(patched.validate().is_ok());
    }
}
