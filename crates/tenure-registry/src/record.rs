//! Member record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

/// Opaque, stable member identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for MemberId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for MemberId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A member as last observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    /// Unique key
    pub id: MemberId,

    /// When the member joined the space, as reported by the space itself
    pub joined_at: Option<DateTime<Utc>>,

    /// Informational only
    pub display_name: String,

    /// Last-known role labels
    pub role_labels: BTreeSet<String>,

    /// Set once the member is seen to have left; the record is kept
    pub departed_at: Option<DateTime<Utc>>,
}

impl MemberRecord {
    /// A record with nothing observed yet.
    pub fn new(id: MemberId) -> Self {
        Self {
            id,
            joined_at: None,
            display_name: String::new(),
            role_labels: BTreeSet::new(),
            departed_at: None,
        }
    }

    /// Record an authoritative join time.
    ///
    /// `None` (the source did not report one) never clears a known value.
    /// Returns the previous value when it was replaced.
    pub fn observe_join(&mut self, joined_at: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        match joined_at {
            Some(ts) if self.joined_at != Some(ts) => self.joined_at.replace(ts),
            _ => None,
        }
    }

    /// Replace the role labels with a fresh observation.
    pub fn set_roles<I, S>(&mut self, roles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_labels = roles.into_iter().map(Into::into).collect();
    }

    /// Merge labels granted and revoked by our own writes.
    pub fn apply_delta(&mut self, added: &BTreeSet<String>, removed: &BTreeSet<String>) {
        for label in removed {
            self.role_labels.remove(label);
        }
        for label in added {
            self.role_labels.insert(label.clone());
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.role_labels.contains(label)
    }

    pub fn is_departed(&self) -> bool {
        self.departed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn join_time_set_once_then_corrected() {
        let mut record = MemberRecord::new("42".into());
        assert_eq!(record.observe_join(Some(ts(100))), None);
        assert_eq!(record.joined_at, Some(ts(100)));

        // Same value: no change.
        assert_eq!(record.observe_join(Some(ts(100))), None);

        // Authoritative correction replaces it.
        assert_eq!(record.observe_join(Some(ts(90))), Some(ts(100)));
        assert_eq!(record.joined_at, Some(ts(90)));
    }

    #[test]
    fn missing_join_time_never_regresses() {
        let mut record = MemberRecord::new("42".into());
        record.observe_join(Some(ts(100)));
        assert_eq!(record.observe_join(None), None);
        assert_eq!(record.joined_at, Some(ts(100)));
    }

    #[test]
    fn delta_merges_with_existing_roles() {
        let mut record = MemberRecord::new("7".into());
        record.set_roles(["Member", "New Member", "Artist"]);

        let added = BTreeSet::from(["3 Month Member".to_string()]);
        let removed = BTreeSet::from(["New Member".to_string()]);
        record.apply_delta(&added, &removed);

        assert!(record.has_label("Artist"));
        assert!(record.has_label("3 Month Member"));
        assert!(!record.has_label("New Member"));
    }

    #[test]
    fn member_id_conversions() {
        assert_eq!(MemberId::from(123u64).as_str(), "123");
        assert_eq!(MemberId::from("abc").to_string(), "abc");
    }
}
