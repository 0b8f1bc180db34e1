//! Daily streak tracking.
//!
//! A streak counts consecutive calendar days (UTC) with at least one activity.

use chrono::{Days, NaiveDate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakState {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
}

/// What an activity did to the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakTransition {
    Started,
    /// Another activity on the same day.
    Unchanged,
    Extended,
    Reset,
    /// The activity predates the last recorded one and was ignored.
    Backdated,
}

/// Applies an activity on `day` to the streak state.
pub fn advance_streak(state: StreakState, day: NaiveDate) -> (StreakState, StreakTransition) {
    let Some(last_day) = state.last_activity_date else {
        let started = StreakState {
            current_streak: 1,
            longest_streak: state.longest_streak.max(1),
            last_activity_date: Some(day),
        };
        return (started, StreakTransition::Started);
    };

    let (current, transition) = match (day - last_day).num_days() {
        d if d < 0 => return (state, StreakTransition::Backdated),
        0 => (state.current_streak.max(1), StreakTransition::Unchanged),
        1 => (state.current_streak + 1, StreakTransition::Extended),
        _ => (1, StreakTransition::Reset),
    };

    let next = StreakState {
        current_streak: current,
        longest_streak: state.longest_streak.max(current),
        last_activity_date: Some(day),
    };
    (next, transition)
}

/// First day of the running streak, if there is one.
pub fn streak_start(current_streak: u32, last_activity_date: Option<NaiveDate>) -> Option<NaiveDate> {
    let last = last_activity_date?;
    let extra_days = current_streak.checked_sub(1)?;
    last.checked_sub_days(Days::new(u64::from(extra_days)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn state(current: u32, longest: u32, last: u32) -> StreakState {
        StreakState {
            current_streak: current,
            longest_streak: longest,
            last_activity_date: Some(day(last)),
        }
    }

    #[test]
    fn first_activity_starts_streak() {
        let (next, transition) = advance_streak(StreakState::default(), day(1));
        assert_eq!(transition, StreakTransition::Started);
        assert_eq!(next, state(1, 1, 1));
    }

    #[test]
    fn same_day_is_idempotent() {
        let (next, transition) = advance_streak(state(3, 5, 10), day(10));
        assert_eq!(transition, StreakTransition::Unchanged);
        assert_eq!(next, state(3, 5, 10));
    }

    #[test]
    fn next_day_extends_and_raises_longest() {
        let (next, transition) = advance_streak(state(5, 5, 10), day(11));
        assert_eq!(transition, StreakTransition::Extended);
        assert_eq!(next, state(6, 6, 11));

        let (next, _) = advance_streak(state(2, 9, 10), day(11));
        assert_eq!(next, state(3, 9, 11));
    }

    #[test]
    fn gap_resets_but_keeps_longest() {
        let (next, transition) = advance_streak(state(4, 7, 10), day(12));
        assert_eq!(transition, StreakTransition::Reset);
        assert_eq!(next, state(1, 7, 12));
    }

    #[test]
    fn backdated_activity_is_ignored() {
        let before = state(4, 7, 10);
        let (next, transition) = advance_streak(before, day(8));
        assert_eq!(transition, StreakTransition::Backdated);
        assert_eq!(next, before);
    }

    #[test]
    fn month_boundary_counts_as_consecutive() {
        let last = StreakState {
            current_streak: 2,
            longest_streak: 2,
            last_activity_date: NaiveDate::from_ymd_opt(2024, 2, 29),
        };
        let (next, transition) = advance_streak(last, day(1));
        assert_eq!(transition, StreakTransition::Extended);
        assert_eq!(next.current_streak, 3);
    }

    #[test]
    fn streak_start_counts_back_from_last_day() {
        assert_eq!(streak_start(3, Some(day(10))), Some(day(8)));
        assert_eq!(streak_start(1, Some(day(10))), Some(day(10)));
        assert_eq!(streak_start(0, Some(day(10))), None);
        assert_eq!(streak_start(2, None), None);
    }
}
