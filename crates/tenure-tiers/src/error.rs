//! Error types for tier tables.

use crate::Tier;
use thiserror::Error;

/// Errors raised when building a [`TierTable`](crate::TierTable).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    /// A tier has no entry in the table.
    #[error("tier table is missing an entry for {0}")]
    MissingTier(Tier),

    /// A tier appears more than once.
    #[error("tier table has more than one entry for {0}")]
    DuplicateTier(Tier),

    /// The lowest tier must start at day zero.
    #[error("{tier} must have a threshold of 0 days, got {days}")]
    NonZeroBase { tier: Tier, days: u32 },

    /// Thresholds must strictly increase with tier rank.
    #[error("threshold for {tier} ({days} days) must be greater than {previous} days")]
    NotIncreasing { tier: Tier, days: u32, previous: u32 },

    /// A tier label is blank.
    #[error("label for {0} is empty")]
    EmptyLabel(Tier),

    /// Two tiers share one label.
    #[error("label {label:?} is used by both {first} and {second}")]
    DuplicateLabel {
        label: String,
        first: Tier,
        second: Tier,
    },
}
