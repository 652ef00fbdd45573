//! Threshold and label table for tiers.
//!
//! Every tier has exactly one entry. Thresholds are in whole elapsed days and
//! strictly increase with rank; the lowest tier starts at day zero, so any
//! eligible member classifies into some tier.

use crate::error::TableError;
use crate::tier::Tier;

/// Threshold and label for a single tier.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TierSpec {
    /// Which tier this entry describes
    pub tier: Tier,

    /// Elapsed days at which the tier is reached
    pub threshold_days: u32,

    /// Role label that marks the tier in the space
    pub label: String,
}

impl TierSpec {
    /// Create a tier entry.
    pub fn new(tier: Tier, threshold_days: u32, label: impl Into<String>) -> Self {
        Self {
            tier,
            threshold_days,
            label: label.into(),
        }
    }

    /// The built-in entry for a tier.
    pub fn default_for(tier: Tier) -> Self {
        Self::new(tier, tier.default_threshold_days(), tier.default_label())
    }
}

/// A validated table with one entry per tier, indexed by [`Tier::index`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "Vec<TierSpec>", into = "Vec<TierSpec>")
)]
pub struct TierTable {
    entries: Vec<TierSpec>,
}

impl TierTable {
    /// Build a table from entries in any order.
    pub fn new(entries: impl IntoIterator<Item = TierSpec>) -> Result<Self, TableError> {
        let mut slots: Vec<Option<TierSpec>> = vec![None; Tier::COUNT];
        for spec in entries {
            let slot = &mut slots[spec.tier.index()];
            if slot.is_some() {
                return Err(TableError::DuplicateTier(spec.tier));
            }
            *slot = Some(spec);
        }

        let mut ordered = Vec::with_capacity(Tier::COUNT);
        for (tier, slot) in Tier::ALL.into_iter().zip(slots) {
            ordered.push(slot.ok_or(TableError::MissingTier(tier))?);
        }

        Self::validate(&ordered)?;
        Ok(Self { entries: ordered })
    }

    fn validate(entries: &[TierSpec]) -> Result<(), TableError> {
        let base = &entries[0];
        if base.threshold_days != 0 {
            return Err(TableError::NonZeroBase {
                tier: base.tier,
                days: base.threshold_days,
            });
        }

        for pair in entries.windows(2) {
            if pair[1].threshold_days <= pair[0].threshold_days {
                return Err(TableError::NotIncreasing {
                    tier: pair[1].tier,
                    days: pair[1].threshold_days,
                    previous: pair[0].threshold_days,
                });
            }
        }

        for (i, spec) in entries.iter().enumerate() {
            if spec.label.trim().is_empty() {
                return Err(TableError::EmptyLabel(spec.tier));
            }
            if let Some(earlier) = entries[..i].iter().find(|e| e.label == spec.label) {
                return Err(TableError::DuplicateLabel {
                    label: spec.label.clone(),
                    first: earlier.tier,
                    second: spec.tier,
                });
            }
        }

        Ok(())
    }

    /// Entries ordered lowest tier first.
    pub fn entries(&self) -> &[TierSpec] {
        &self.entries
    }

    /// Threshold in days for a tier.
    pub fn threshold(&self, tier: Tier) -> u32 {
        self.entries[tier.index()].threshold_days
    }

    /// Role label for a tier.
    pub fn label(&self, tier: Tier) -> &str {
        &self.entries[tier.index()].label
    }

    /// The tier a role label stands for, if it is a tier label.
    pub fn tier_for_label(&self, label: &str) -> Option<Tier> {
        self.entries.iter().find(|e| e.label == label).map(|e| e.tier)
    }

    /// Whether a role label belongs to the tier table.
    pub fn is_tier_label(&self, label: &str) -> bool {
        self.tier_for_label(label).is_some()
    }

    /// All tier labels, lowest tier first.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    /// Classify elapsed membership days against this table.
    ///
    /// Returns `None` when the prerequisite is absent. Negative elapsed days
    /// (join time in the future) count as day zero.
    pub fn classify(&self, elapsed_days: i64, prerequisite_present: bool) -> Option<Tier> {
        if !prerequisite_present {
            return None;
        }
        let days = elapsed_days.max(0);
        self.entries
            .iter()
            .rev()
            .find(|e| i64::from(e.threshold_days) <= days)
            .map(|e| e.tier)
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            entries: Tier::ALL.into_iter().map(TierSpec::default_for).collect(),
        }
    }
}

impl TryFrom<Vec<TierSpec>> for TierTable {
    type Error = TableError;

    fn try_from(entries: Vec<TierSpec>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl From<TierTable> for Vec<TierSpec> {
    fn from(table: TierTable) -> Self {
        table.entries
    }
}
