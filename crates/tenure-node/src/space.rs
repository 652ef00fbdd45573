//! The seam to the community space (chat platform).
//!
//! The node never talks to the platform directly; it goes through a
//! [`SpaceClient`]. Member data crosses the seam as immutable
//! [`MemberSnapshot`]s taken at the start of a pass or carried by an event,
//! so nothing downstream depends on a live platform object.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tenure_registry::{MemberId, MemberRecord};
use thiserror::Error;

/// Failures reported by a space client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// Network trouble, rate limiting or a timeout; worth one retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The role or member does not exist in the space.
    #[error("not found: {0}")]
    NotFound(String),

    /// The client lacks the rights to do this.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A member as reported by the space at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub id: MemberId,

    #[serde(default)]
    pub display_name: String,

    /// The space's own record of when the member joined
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub is_bot: bool,
}

impl MemberSnapshot {
    pub fn new(id: impl Into<MemberId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            joined_at: None,
            roles: Vec::new(),
            is_bot: false,
        }
    }

    pub fn joined(mut self, at: DateTime<Utc>) -> Self {
        self.joined_at = Some(at);
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn bot(mut self) -> Self {
        self.is_bot = true;
        self
    }

    /// Fold this observation into a registry record.
    ///
    /// The join time is authoritative and replaces a differing stored value;
    /// a missing one leaves the stored value alone. A member seen in the space
    /// is by definition present, so any departure mark is cleared. Returns the
    /// join time that was replaced, if any.
    pub fn absorb_into(&self, record: &mut MemberRecord) -> Option<DateTime<Utc>> {
        let replaced = record.observe_join(self.joined_at);
        record.display_name = self.display_name.clone();
        record.set_roles(self.roles.iter().cloned());
        record.departed_at = None;
        replaced
    }
}

/// Signals pushed by the space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceEvent {
    /// A member joined (or rejoined) the space.
    MemberJoined(MemberSnapshot),

    /// A member's role set changed.
    RolesChanged {
        id: MemberId,
        display_name: Option<String>,
        roles: Vec<String>,
        is_bot: bool,
    },

    /// A member left the space.
    MemberLeft { id: MemberId },
}

impl SpaceEvent {
    /// The member this event concerns.
    pub fn member_id(&self) -> &MemberId {
        match self {
            Self::MemberJoined(snapshot) => &snapshot.id,
            Self::RolesChanged { id, .. } | Self::MemberLeft { id } => id,
        }
    }
}

/// Access to the community space.
#[async_trait]
pub trait SpaceClient: Send + Sync {
    /// Every current member of the space.
    async fn list_members(&self) -> Result<Vec<MemberSnapshot>, ClientError>;

    /// Grant a role label to a member.
    async fn add_role(&self, id: &MemberId, label: &str) -> Result<(), ClientError>;

    /// Revoke a role label from a member.
    async fn remove_role(&self, id: &MemberId, label: &str) -> Result<(), ClientError>;
}
