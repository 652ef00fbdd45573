//! The tier enumeration.

use std::fmt;

/// A membership tier, ordered by seniority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Tier {
    NewMember,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    ThreeYears,
}

impl Tier {
    /// Number of tiers.
    pub const COUNT: usize = 6;

    /// All tiers, lowest first.
    pub const ALL: [Tier; Self::COUNT] = [
        Tier::NewMember,
        Tier::ThreeMonths,
        Tier::SixMonths,
        Tier::OneYear,
        Tier::TwoYears,
        Tier::ThreeYears,
    ];

    /// Position of this tier in [`Tier::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Elapsed days at which this tier is reached in the default table.
    pub const fn default_threshold_days(self) -> u32 {
        match self {
            Tier::NewMember => 0,
            Tier::ThreeMonths => 90,
            Tier::SixMonths => 180,
            Tier::OneYear => 365,
            Tier::TwoYears => 730,
            Tier::ThreeYears => 1095,
        }
    }

    /// Role label for this tier in the default table.
    pub const fn default_label(self) -> &'static str {
        match self {
            Tier::NewMember => "New Member",
            Tier::ThreeMonths => "3 Month Member",
            Tier::SixMonths => "6 Month Member",
            Tier::OneYear => "1 Year Member",
            Tier::TwoYears => "2 Year Member",
            Tier::ThreeYears => "3 Year Member",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::NewMember => "NewMember",
            Tier::ThreeMonths => "ThreeMonths",
            Tier::SixMonths => "SixMonths",
            Tier::OneYear => "OneYear",
            Tier::TwoYears => "TwoYears",
            Tier::ThreeYears => "ThreeYears",
        };
        f.write_str(name)
    }
}
