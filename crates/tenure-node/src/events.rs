//! Tier transition notifications.
//!
//! Published on a broadcast channel whenever applied mutations change the
//! tier a member holds. Rendering announcements is left to subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tenure_registry::MemberId;
use tenure_tiers::Tier;

/// A member's held tier changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierTransition {
    pub member_id: MemberId,
    pub display_name: String,
    pub from: Option<Tier>,
    pub to: Option<Tier>,
    pub at: DateTime<Utc>,
}

impl TierTransition {
    /// Moved to a higher tier, or gained a first one.
    pub fn is_promotion(&self) -> bool {
        self.to > self.from
    }

    /// First tier granted to a member who held none.
    pub fn is_welcome(&self) -> bool {
        self.from.is_none() && self.to.is_some()
    }
}

impl fmt::Display for TierTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |tier: Option<Tier>| tier.map_or_else(|| "none".to_string(), |t| t.to_string());
        write!(
            f,
            "tier changed from {} to {} for member {}",
            name(self.from),
            name(self.to),
            self.member_id
        )
    }
}
