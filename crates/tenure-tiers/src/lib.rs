//! Tenure Tiers
//!
//! Membership tiers derived from how long a member has belonged to a space,
//! and the role-label arithmetic that keeps a member's labels converged on
//! exactly one tier.
//!
//! # Classification
//!
//! A member's tier is a pure function of elapsed days since joining, gated by
//! an optional prerequisite label:
//!
//! - prerequisite absent → no tier (all tier labels are cleaned up)
//! - otherwise → highest tier whose threshold is ≤ elapsed days
//!
//! # Reconciliation
//!
//! The [`Reconciler`] diffs a member's held labels against the label of the
//! classified tier and produces a minimal [`MutationPlan`]. Labels outside the
//! tier table are never touched. Running the reconciler again after a plan has
//! been applied yields an empty plan.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeSet;
//! use tenure_tiers::{Reconciler, Tier, TierTable};
//!
//! let table = TierTable::default();
//! let tier = table.classify(95, true);
//! assert_eq!(tier, Some(Tier::ThreeMonths));
//!
//! let held: BTreeSet<String> = ["New Member".to_string()].into();
//! let plan = Reconciler::new(table).reconcile(&held, tier);
//! assert!(plan.add.contains("3 Month Member"));
//! assert!(plan.remove.contains("New Member"));
//! ```

mod classify;
mod error;
mod reconcile;
mod table;
mod tier;

pub use classify::{classify, elapsed_days, SECONDS_PER_DAY};
pub use error::TableError;
pub use reconcile::{MutationPlan, Reconciler};
pub use table::{TierSpec, TierTable};
pub use tier::Tier;
