//! In-memory identity-provider backend.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use stint_auth::{GroupId, UserId};
use stint_directory::{
    DirectoryClient, DirectoryError, Group, GroupKey, GroupType, Membership, MembershipId,
    MembershipRole, MembershipSummary,
};

/// Role name assigned to provisioned memberships.
const MEMBER_ROLE: &str = "MEMBER";

/// In-memory [`DirectoryClient`].
///
/// Group creation is idempotent and membership listing is kept separate
/// from membership details, so tests can model the listing/lookup race
/// (a membership that vanishes between the two calls).
#[derive(Default)]
pub struct MemoryDirectory {
    groups: DashMap<GroupId, Group>,
    keys: DashMap<GroupKey, GroupId>,
    summaries: DashMap<UserId, Vec<MembershipSummary>>,
    details: DashMap<MembershipId, Membership>,
    poisoned: DashMap<MembershipId, ()>,
    next_id: AtomicU64,
    patch_count: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of description patches issued so far. Lets tests assert
    /// on the provisioning fast path.
    pub fn patch_count(&self) -> usize {
        self.patch_count.load(Ordering::Relaxed)
    }

    /// Current description of a group, if the group exists.
    pub fn description(&self, id: &GroupId) -> Option<String> {
        self.groups.get(id).map(|g| g.description.clone())
    }

    /// Test hook: register a membership in the user's listing and store
    /// its details. Returns the membership id.
    pub fn insert_membership(
        &self,
        group: &GroupId,
        user: &UserId,
        expiry: Option<DateTime<Utc>>,
    ) -> MembershipId {
        let id = MembershipId(self.next("memberships/"));
        self.details.insert(
            id.clone(),
            Membership {
                id: id.clone(),
                member: user.clone(),
                roles: vec![MembershipRole {
                    name: MEMBER_ROLE.to_string(),
                    expiry,
                }],
            },
        );
        self.summaries
            .entry(user.clone())
            .or_default()
            .push(MembershipSummary {
                group: group.clone(),
                membership: id.clone(),
            });
        id
    }

    /// Test hook: drop a membership's details while leaving it listed,
    /// modeling a membership that expired between listing and lookup.
    pub fn remove_membership_details(&self, id: &MembershipId) {
        self.details.remove(id);
    }

    /// Test hook: make detail lookups for a membership fail with a
    /// transport error.
    pub fn poison_membership(&self, id: &MembershipId) {
        self.poisoned.insert(id.clone(), ());
    }

    /// Membership details for a user in a group, if present.
    pub fn membership_for(&self, group: &GroupId, user: &UserId) -> Option<Membership> {
        let summaries = self.summaries.get(user)?;
        let summary = summaries.iter().find(|s| &s.group == group)?;
        self.details.get(&summary.membership).map(|m| m.clone())
    }
}

#[async_trait::async_trait]
impl DirectoryClient for MemoryDirectory {
    async fn list_memberships_by_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<MembershipSummary>, DirectoryError> {
        Ok(self
            .summaries
            .get(user)
            .map(|entries| entries.clone())
            .unwrap_or_default())
    }

    async fn get_membership(&self, id: &MembershipId) -> Result<Membership, DirectoryError> {
        if self.poisoned.contains_key(id) {
            return Err(DirectoryError::Transport(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "membership lookup failed",
            ))));
        }
        self.details
            .get(id)
            .map(|m| m.clone())
            .ok_or(DirectoryError::NotFound)
    }

    async fn create_group(
        &self,
        id: &GroupId,
        _group_type: GroupType,
        display_name: &str,
        description: &str,
    ) -> Result<GroupKey, DirectoryError> {
        if let Some(existing) = self.groups.get(id) {
            return Ok(existing.key.clone());
        }
        let key = GroupKey(self.next("groups/"));
        self.groups.insert(
            id.clone(),
            Group {
                key: key.clone(),
                id: id.clone(),
                display_name: display_name.to_string(),
                description: description.to_string(),
            },
        );
        self.keys.insert(key.clone(), id.clone());
        Ok(key)
    }

    async fn add_membership(
        &self,
        group: &GroupKey,
        user: &UserId,
        expiry: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        let group_id = self
            .keys
            .get(group)
            .map(|id| id.clone())
            .ok_or(DirectoryError::NotFound)?;

        // Replace any existing membership of this user in this group.
        if let Some(mut summaries) = self.summaries.get_mut(user) {
            if let Some(pos) = summaries.iter().position(|s| s.group == group_id) {
                let old = summaries.remove(pos);
                self.details.remove(&old.membership);
            }
        }
        self.insert_membership(&group_id, user, Some(expiry));
        Ok(())
    }

    async fn get_group(&self, id: &GroupId) -> Result<Group, DirectoryError> {
        self.groups
            .get(id)
            .map(|g| g.clone())
            .ok_or(DirectoryError::NotFound)
    }

    async fn patch_group(&self, key: &GroupKey, description: &str) -> Result<(), DirectoryError> {
        let id = self
            .keys
            .get(key)
            .map(|id| id.clone())
            .ok_or(DirectoryError::NotFound)?;
        let mut group = self.groups.get_mut(&id).ok_or(DirectoryError::NotFound)?;
        group.description = description.to_string();
        self.patch_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn search_groups(&self, prefix: &str) -> Result<Vec<Group>, DirectoryError> {
        let mut groups: Vec<Group> = self
            .groups
            .iter()
            .filter(|entry| entry.key().email().starts_with(prefix))
            .map(|entry| entry.value().clone())
            .collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(groups)
    }
}
