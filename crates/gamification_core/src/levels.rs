//! Level and tier derivation.
//!
//! Levels follow a geometric threshold curve: leaving level 1 costs
//! `level_base_points`, and every later level costs `level_scaling` times more,
//! truncated to cents. The result depends on nothing but the total.

use crate::domain::{PointValues, Tier};

/// Hard ceiling so a degenerate curve cannot loop forever.
pub const MAX_LEVEL: u32 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelProgress {
    pub level: u32,
    pub points_to_next_level: f64,
    pub tier: Tier,
}

/// Points needed to go from `level` to `level + 1`.
pub fn level_threshold(level: u32, base: f64, scaling: f64) -> f64 {
    if level <= 1 {
        return base;
    }
    (base * scaling.powi((level - 1) as i32) * 100.0).floor() / 100.0
}

/// Derives level, tier and points-to-next-level from a cumulative point total.
pub fn derive_level_tier(total_points: f64, values: &PointValues) -> LevelProgress {
    let total = if total_points.is_finite() && total_points > 0.0 {
        total_points
    } else {
        0.0
    };

    let mut level = 1;
    let mut crossed = 0.0;
    loop {
        let next = crossed + level_threshold(level, values.level_base_points, values.level_scaling);
        if next > total || level >= MAX_LEVEL {
            return LevelProgress {
                level,
                points_to_next_level: round2((next - total).max(0.0)),
                tier: Tier::for_level(level),
            };
        }
        crossed = next;
        level += 1;
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> PointValues {
        PointValues::default()
    }

    #[test]
    fn zero_points_is_level_one() {
        let progress = derive_level_tier(0.0, &values());
        assert_eq!(progress.level, 1);
        assert_eq!(progress.points_to_next_level, 100.0);
        assert_eq!(progress.tier, Tier::Bronze);
    }

    #[test]
    fn thresholds_accumulate_geometrically() {
        let v = values();
        assert_eq!(level_threshold(1, 100.0, 1.5), 100.0);
        assert_eq!(level_threshold(2, 100.0, 1.5), 150.0);
        assert_eq!(level_threshold(3, 100.0, 1.5), 225.0);

        assert_eq!(derive_level_tier(99.99, &v).level, 1);
        let at_two = derive_level_tier(100.0, &v);
        assert_eq!(at_two.level, 2);
        assert_eq!(at_two.points_to_next_level, 150.0);
        assert_eq!(derive_level_tier(249.99, &v).level, 2);
        assert_eq!(derive_level_tier(250.0, &v).level, 3);
        assert_eq!(derive_level_tier(260.5, &v).points_to_next_level, 214.5);
    }

    #[test]
    fn thresholds_truncate_to_cents() {
        assert_eq!(level_threshold(2, 10.0, 1.25), 12.5);
        assert_eq!(level_threshold(3, 10.0, 1.25), 15.62);
        assert_eq!(level_threshold(4, 10.0, 1.25), 19.53);
    }

    #[test]
    fn tiers_follow_level_bands() {
        assert_eq!(Tier::for_level(1), Tier::Bronze);
        assert_eq!(Tier::for_level(9), Tier::Bronze);
        assert_eq!(Tier::for_level(10), Tier::Silver);
        assert_eq!(Tier::for_level(20), Tier::Gold);
        assert_eq!(Tier::for_level(30), Tier::Platinum);
        assert_eq!(Tier::for_level(49), Tier::Platinum);
        assert_eq!(Tier::for_level(50), Tier::Diamond);
    }

    #[test]
    fn level_is_monotonic_and_deterministic() {
        let v = PointValues {
            level_base_points: 10.0,
            level_scaling: 1.1,
            ..PointValues::default()
        };
        let mut previous = 0;
        for step in 0..5_000 {
            let total = step as f64 * 3.7;
            let first = derive_level_tier(total, &v);
            assert_eq!(first, derive_level_tier(total, &v));
            assert!(first.level >= previous);
            previous = first.level;
        }
    }

    #[test]
    fn degenerate_inputs_stay_bounded() {
        let v = values();
        assert_eq!(derive_level_tier(-5.0, &v).level, 1);
        assert_eq!(derive_level_tier(f64::NAN, &v).level, 1);

        let flat = PointValues {
            level_base_points: 0.0,
            ..PointValues::default()
        };
        assert_eq!(derive_level_tier(1.0, &flat).level, MAX_LEVEL);
    }
}
