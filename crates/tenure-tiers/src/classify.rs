//! Tier classification from elapsed membership time.

use crate::tier::Tier;
use chrono::{DateTime, Utc};

/// Seconds in one classification day.
pub const SECONDS_PER_DAY: i64 = 60 * 60 * 24;

/// Classify against the built-in thresholds.
///
/// Returns the highest tier whose threshold is ≤ `elapsed_days`, or `None`
/// when the prerequisite label is absent. Total and deterministic.
///
/// ```
/// use tenure_tiers::{classify, Tier};
///
/// assert_eq!(classify(0, true), Some(Tier::NewMember));
/// assert_eq!(classify(89, true), Some(Tier::NewMember));
/// assert_eq!(classify(90, true), Some(Tier::ThreeMonths));
/// assert_eq!(classify(1095, true), Some(Tier::ThreeYears));
/// assert_eq!(classify(400, false), None);
/// ```
pub fn classify(elapsed_days: i64, prerequisite_present: bool) -> Option<Tier> {
    if !prerequisite_present {
        return None;
    }
    let days = elapsed_days.max(0);
    Tier::ALL
        .into_iter()
        .rev()
        .find(|tier| i64::from(tier.default_threshold_days()) <= days)
}

/// Whole days between joining and `now`, rounded down, never negative.
pub fn elapsed_days(joined_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (now - joined_at).num_seconds();
    if seconds <= 0 {
        0
    } else {
        seconds / SECONDS_PER_DAY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TierTable;
    use chrono::Duration;
    use proptest::prelude::*;

    #[test]
    fn threshold_table() {
        let cases = [
            (0, Tier::NewMember),
            (89, Tier::NewMember),
            (90, Tier::ThreeMonths),
            (179, Tier::ThreeMonths),
            (180, Tier::SixMonths),
            (364, Tier::SixMonths),
            (365, Tier::OneYear),
            (729, Tier::OneYear),
            (730, Tier::TwoYears),
            (1094, Tier::TwoYears),
            (1095, Tier::ThreeYears),
            (10_000, Tier::ThreeYears),
        ];

        for (days, expected) in cases {
            assert_eq!(
                classify(days, true),
                Some(expected),
                "classify({}) should be {}",
                days,
                expected
            );
        }
    }

    #[test]
    fn prerequisite_gates_everything() {
        for days in [0, 90, 365, 5000] {
            assert_eq!(classify(days, false), None);
        }
    }

    #[test]
    fn negative_days_are_new_member() {
        assert_eq!(classify(-3, true), Some(Tier::NewMember));
    }

    #[test]
    fn elapsed_days_rounds_down() {
        let joined = DateTime::<Utc>::from_timestamp(1_600_000_000, 0).unwrap();
        assert_eq!(elapsed_days(joined, joined), 0);
        assert_eq!(elapsed_days(joined, joined + Duration::hours(23)), 0);
        assert_eq!(elapsed_days(joined, joined + Duration::days(95)), 95);
        assert_eq!(
            elapsed_days(joined, joined + Duration::days(95) + Duration::hours(23)),
            95
        );
        assert_eq!(elapsed_days(joined, joined - Duration::days(2)), 0);
    }

    proptest! {
        #[test]
        fn classify_is_monotonic(a in -10i64..5000, b in -10i64..5000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(classify(lo, true) <= classify(hi, true));
        }

        #[test]
        fn classify_always_yields_a_tier(days in any::<i64>()) {
            prop_assert!(classify(days, true).is_some());
        }

        #[test]
        fn default_table_agrees_with_builtin(days in -10i64..5000, present in any::<bool>()) {
            prop_assert_eq!(TierTable::default().classify(days, present), classify(days, present));
        }
    }
}
