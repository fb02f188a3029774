//! Wire types exchanged with the directory and resource manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stint_auth::{GroupId, UserId};
use std::fmt;

/// Opaque handle to a directory group, assigned by the directory when
/// the group is created. Not the same as the group's email address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey(pub String);

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a group membership.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MembershipId(pub String);

impl fmt::Display for MembershipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of directory group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupType {
    /// A group usable in access control decisions.
    Security,
}

/// A directory group.
#[derive(Clone, Debug)]
pub struct Group {
    pub key: GroupKey,
    pub id: GroupId,
    pub display_name: String,
    pub description: String,
}

/// One role a member holds within a group, optionally time-bounded.
#[derive(Clone, Debug)]
pub struct MembershipRole {
    pub name: String,
    pub expiry: Option<DateTime<Utc>>,
}

/// Details of one user's membership in one group.
#[derive(Clone, Debug)]
pub struct Membership {
    pub id: MembershipId,
    pub member: UserId,
    pub roles: Vec<MembershipRole>,
}

impl Membership {
    /// Earliest expiry across the membership's roles, if any role is
    /// time-bounded.
    pub fn earliest_expiry(&self) -> Option<DateTime<Utc>> {
        self.roles.iter().filter_map(|r| r.expiry).min()
    }
}

/// Entry returned when listing a user's memberships. Role details
/// require a separate lookup.
#[derive(Clone, Debug)]
pub struct MembershipSummary {
    pub group: GroupId,
    pub membership: MembershipId,
}

/// A resource that role bindings attach to. Opaque to stint apart from
/// its kind (e.g. `project`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    kind: String,
    value: String,
}

impl ResourceId {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.value)
    }
}

/// Condition attached to an IAM binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IamCondition {
    pub title: String,
    pub expression: String,
}

/// One binding in a resource's IAM policy: a role granted to a set of
/// prefixed members (`user:...`, `group:...`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IamBinding {
    pub role: String,
    pub members: Vec<String>,
    pub condition: Option<IamCondition>,
}

/// A resource's IAM policy, as read and written through the resource
/// manager's read-modify-write protocol.
#[derive(Clone, Debug, Default)]
pub struct IamPolicy {
    pub bindings: Vec<IamBinding>,
    pub etag: String,
}

/// A signed token and its validity horizon.
#[derive(Clone, Debug)]
pub struct SignedToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}
