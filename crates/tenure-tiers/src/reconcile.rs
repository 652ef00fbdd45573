//! Converging held role labels onto a single canonical tier.
//!
//! The reconciler never looks at which tier a member *appears* to hold; it
//! only diffs held tier labels against the label of the classified tier. A
//! member who was granted a label by hand, kept a stale one after losing the
//! prerequisite, or ended up with several after a partial failure converges
//! in one pass.

use crate::table::TierTable;
use crate::tier::Tier;
use std::collections::BTreeSet;

/// Label mutations for one member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationPlan {
    /// Labels to grant
    pub add: BTreeSet<String>,

    /// Labels to revoke
    pub remove: BTreeSet<String>,
}

impl MutationPlan {
    /// Whether the plan changes nothing.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Total number of mutations.
    pub fn len(&self) -> usize {
        self.add.len() + self.remove.len()
    }

    /// Apply the plan to a label set in place.
    pub fn apply_to(&self, labels: &mut BTreeSet<String>) {
        for label in &self.remove {
            labels.remove(label);
        }
        for label in &self.add {
            labels.insert(label.clone());
        }
    }
}

/// Computes minimal [`MutationPlan`]s against a [`TierTable`].
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    table: TierTable,
}

impl Reconciler {
    pub fn new(table: TierTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &TierTable {
        &self.table
    }

    /// Diff `held` against the label for `target`.
    ///
    /// With no target every held tier label is removed. Otherwise every held
    /// tier label other than the target's is removed, and the target's label
    /// is added when missing. Non-tier labels are ignored.
    pub fn reconcile(&self, held: &BTreeSet<String>, target: Option<Tier>) -> MutationPlan {
        let wanted = target.map(|tier| self.table.label(tier));

        let remove = held
            .iter()
            .filter(|label| self.table.is_tier_label(label))
            .filter(|label| Some(label.as_str()) != wanted)
            .cloned()
            .collect();

        let add = wanted
            .filter(|label| !held.contains(*label))
            .map(|label| BTreeSet::from([label.to_string()]))
            .unwrap_or_default();

        MutationPlan { add, remove }
    }

    /// Tiers whose labels are currently held, lowest first.
    pub fn held_tiers(&self, held: &BTreeSet<String>) -> Vec<Tier> {
        let mut tiers: Vec<Tier> = held
            .iter()
            .filter_map(|label| self.table.tier_for_label(label))
            .collect();
        tiers.sort();
        tiers
    }

    /// The highest tier whose label is held.
    pub fn held_tier(&self, held: &BTreeSet<String>) -> Option<Tier> {
        self.held_tiers(held).pop()
    }
}
