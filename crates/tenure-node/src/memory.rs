//! In-memory space.
//!
//! Holds a role catalogue and a member table behind a mutex and implements
//! [`SpaceClient`] against them. Granting a role that is not in the
//! catalogue fails with [`ClientError::NotFound`], like a deleted role on a
//! real platform. Faults can be scripted: a forbidden mode and queues of
//! transient failures for mutations and listings.

use crate::error::Result;
use crate::space::{ClientError, MemberSnapshot, SpaceClient};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tenure_registry::MemberId;
use tenure_tiers::TierTable;

/// A mutation that reached the space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleCall {
    Add(MemberId, String),
    Remove(MemberId, String),
}

#[derive(Debug, Default)]
struct SpaceState {
    catalogue: BTreeSet<String>,
    members: BTreeMap<MemberId, MemberSnapshot>,
    forbidden: bool,
    failing_mutations: u32,
    failing_listings: u32,
    calls: Vec<RoleCall>,
}

/// Serialized form accepted by [`MemorySpace::load_fixture`].
#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    members: Vec<MemberSnapshot>,
}

/// A community space held entirely in memory.
#[derive(Debug, Default)]
pub struct MemorySpace {
    state: Mutex<SpaceState>,
}

impl MemorySpace {
    /// A space whose catalogue holds `roles`.
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let space = Self::default();
        space.lock().catalogue = roles.into_iter().map(Into::into).collect();
        space
    }

    /// A space with every tier label of `table` plus `extra` roles.
    pub fn with_tiers<I, S>(table: &TierTable, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles = table
            .labels()
            .map(String::from)
            .chain(extra.into_iter().map(Into::into));
        Self::new(roles)
    }

    /// Load roles and members from a JSON fixture.
    ///
    /// ```json
    /// {"roles": ["Member", "New Member"],
    ///  "members": [{"id": "1", "display_name": "ada",
    ///               "joined_at": "2023-01-01T00:00:00Z", "roles": ["Member"]}]}
    /// ```
    pub fn load_fixture<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let fixture: Fixture = serde_json::from_str(&text)?;
        let space = Self::new(fixture.roles);
        for member in fixture.members {
            space.insert_member(member);
        }
        Ok(space)
    }

    fn lock(&self) -> MutexGuard<'_, SpaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove a role from the catalogue and from every member holding it.
    pub fn delete_role(&self, label: &str) {
        let mut state = self.lock();
        state.catalogue.remove(label);
        for member in state.members.values_mut() {
            member.roles.retain(|r| r != label);
        }
    }

    pub fn insert_member(&self, member: MemberSnapshot) {
        self.lock().members.insert(member.id.clone(), member);
    }

    pub fn remove_member(&self, id: &MemberId) -> Option<MemberSnapshot> {
        self.lock().members.remove(id)
    }

    pub fn member(&self, id: &MemberId) -> Option<MemberSnapshot> {
        self.lock().members.get(id).cloned()
    }

    /// Current roles of a member, sorted.
    pub fn roles_of(&self, id: &MemberId) -> BTreeSet<String> {
        self.lock()
            .members
            .get(id)
            .map(|m| m.roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Overwrite a member's roles, as a human moderator would.
    pub fn set_roles<I, S>(&self, id: &MemberId, roles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(member) = self.lock().members.get_mut(id) {
            member.roles = roles.into_iter().map(Into::into).collect();
        }
    }

    /// Refuse every mutation while set.
    pub fn set_forbidden(&self, forbidden: bool) {
        self.lock().forbidden = forbidden;
    }

    /// Fail the next `n` mutations with a transient error.
    pub fn fail_mutations(&self, n: u32) {
        self.lock().failing_mutations = n;
    }

    /// Fail the next `n` listings with a transient error.
    pub fn fail_listings(&self, n: u32) {
        self.lock().failing_listings = n;
    }

    /// Every mutation that succeeded, in order.
    pub fn calls(&self) -> Vec<RoleCall> {
        self.lock().calls.clone()
    }

    fn mutate(&self, call: RoleCall) -> std::result::Result<(), ClientError> {
        let mut state = self.lock();

        if state.failing_mutations > 0 {
            state.failing_mutations -= 1;
            return Err(ClientError::Transient("simulated outage".into()));
        }
        if state.forbidden {
            return Err(ClientError::Forbidden("missing manage-roles permission".into()));
        }

        let (id, label) = match &call {
            RoleCall::Add(id, label) | RoleCall::Remove(id, label) => (id.clone(), label.clone()),
        };
        if !state.catalogue.contains(&label) {
            return Err(ClientError::NotFound(format!("role {:?}", label)));
        }
        let member = state
            .members
            .get_mut(&id)
            .ok_or_else(|| ClientError::NotFound(format!("member {}", id)))?;

        match &call {
            RoleCall::Add(..) => {
                if !member.roles.contains(&label) {
                    member.roles.push(label);
                }
            }
            RoleCall::Remove(..) => member.roles.retain(|r| *r != label),
        }
        state.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl SpaceClient for MemorySpace {
    async fn list_members(&self) -> std::result::Result<Vec<MemberSnapshot>, ClientError> {
        let mut state = self.lock();
        if state.failing_listings > 0 {
            state.failing_listings -= 1;
            return Err(ClientError::Transient("simulated outage".into()));
        }
        Ok(state.members.values().cloned().collect())
    }

    async fn add_role(&self, id: &MemberId, label: &str) -> std::result::Result<(), ClientError> {
        self.mutate(RoleCall::Add(id.clone(), label.to_string()))
    }

    async fn remove_role(&self, id: &MemberId, label: &str) -> std::result::Result<(), ClientError> {
        self.mutate(RoleCall::Remove(id.clone(), label.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> MemorySpace {
        let space = MemorySpace::with_tiers(&TierTable::default(), ["Member"]);
        space.insert_member(MemberSnapshot::new("1", "ada").with_roles(["Member"]));
        space
    }

    #[tokio::test]
    async fn add_and_remove_roles() {
        let space = space();
        let id = MemberId::from("1");
        space.add_role(&id, "New Member").await.unwrap();
        space.add_role(&id, "New Member").await.unwrap();
        assert_eq!(space.member(&id).unwrap().roles, vec!["Member", "New Member"]);

        space.remove_role(&id, "New Member").await.unwrap();
        assert_eq!(space.roles_of(&id), BTreeSet::from(["Member".to_string()]));
        assert_eq!(space.calls().len(), 3);
    }

    #[tokio::test]
    async fn unknown_role_is_not_found() {
        let space = space();
        let err = space.add_role(&"1".into(), "Founder").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
        assert!(space.calls().is_empty());
    }

    #[tokio::test]
    async fn scripted_faults() {
        let space = space();
        let id = MemberId::from("1");

        space.fail_mutations(1);
        assert!(space.add_role(&id, "New Member").await.unwrap_err().is_transient());
        assert!(space.add_role(&id, "New Member").await.is_ok());

        space.set_forbidden(true);
        assert!(matches!(
            space.remove_role(&id, "New Member").await,
            Err(ClientError::Forbidden(_))
        ));

        space.fail_listings(1);
        assert!(space.list_members().await.is_err());
        assert_eq!(space.list_members().await.unwrap().len(), 1);
    }

    #[test]
    fn deleting_role_strips_holders() {
        let space = space();
        space.delete_role("Member");
        assert!(space.roles_of(&"1".into()).is_empty());
    }

    #[test]
    fn fixture_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("space.json");
        std::fs::write(
            &path,
            r#"{"roles": ["Member"], "members": [
                {"id": "1", "display_name": "ada", "joined_at": "2023-01-01T00:00:00Z", "roles": ["Member"]},
                {"id": "2", "display_name": "bot", "is_bot": true}
            ]}"#,
        )
        .unwrap();

        let space = MemorySpace::load_fixture(&path).unwrap();
        assert!(space.member(&"1".into()).is_some());
        assert!(space.member(&"2".into()).unwrap().is_bot);
    }
}
