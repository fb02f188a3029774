//! Principals carried by a subject and referenced by access control lists.

use crate::ids::{ClassId, GroupId, IdError, JitGroupId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a principal, by kind and value.
///
/// This is what access control entries reference and what subject
/// membership is keyed by. Expiry is not part of the identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrincipalId {
    /// An individual user account.
    User(UserId),
    /// A directory group.
    Group(GroupId),
    /// A stint group, held through an active time-bounded membership.
    JitGroup(JitGroupId),
    /// A class of users.
    Class(ClassId),
}

impl PrincipalId {
    pub fn kind(&self) -> &'static str {
        match self {
            PrincipalId::User(_) => "user",
            PrincipalId::Group(_) => "group",
            PrincipalId::JitGroup(_) => "jit-group",
            PrincipalId::Class(_) => "class",
        }
    }

    fn value(&self) -> String {
        match self {
            PrincipalId::User(id) => id.to_string(),
            PrincipalId::Group(id) => id.to_string(),
            PrincipalId::JitGroup(id) => id.to_string(),
            PrincipalId::Class(id) => id.to_string(),
        }
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

impl FromStr for PrincipalId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("user", v)) => Ok(PrincipalId::User(v.parse()?)),
            Some(("group", v)) => Ok(PrincipalId::Group(v.parse()?)),
            Some(("jit-group", v)) => Ok(PrincipalId::JitGroup(v.parse()?)),
            Some(("class", v)) => Ok(PrincipalId::Class(v.parse()?)),
            _ => Err(IdError::InvalidPrincipal(s.to_string())),
        }
    }
}

/// A principal held by a subject, with an optional expiry.
///
/// Equality and hashing consider the identity only; the expiry rides
/// along so that time-bounded memberships can report when they lapse.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Principal {
    id: PrincipalId,
    expiry: Option<DateTime<Utc>>,
}

impl Principal {
    /// A principal without an expiry.
    pub fn new(id: PrincipalId) -> Self {
        Self { id, expiry: None }
    }

    /// A time-bounded principal, typically a stint group membership.
    pub fn with_expiry(id: PrincipalId, expiry: DateTime<Utc>) -> Self {
        Self {
            id,
            expiry: Some(expiry),
        }
    }

    pub fn id(&self) -> &PrincipalId {
        &self.id
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    /// Whether the principal is valid at the given time.
    pub fn is_valid(&self, at: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => at < expiry,
            None => true,
        }
    }
}

impl PartialEq for Principal {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Principal {}

impl std::hash::Hash for Principal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(email: &str) -> PrincipalId {
        PrincipalId::User(UserId::new(email).unwrap())
    }

    #[test]
    fn test_principal_id_display_roundtrip() {
        let ids = [
            user("alice@example.com"),
            PrincipalId::Group(GroupId::new("devs@example.com").unwrap()),
            PrincipalId::JitGroup(JitGroupId::new("prod", "web", "admins")),
            PrincipalId::Class(ClassId::AuthenticatedUsers),
        ];
        for id in ids {
            let parsed: PrincipalId = id.to_string().parse().unwrap();
            assert_eq!(id, parsed);
        }
    }

    #[test]
    fn test_principal_id_parse_rejects_unknown_kind() {
        assert!("robot:r2d2@example.com".parse::<PrincipalId>().is_err());
        assert!("alice@example.com".parse::<PrincipalId>().is_err());
    }

    #[test]
    fn test_principal_equality_ignores_expiry() {
        let now = Utc::now();
        let id = PrincipalId::JitGroup(JitGroupId::new("prod", "web", "admins"));
        let a = Principal::with_expiry(id.clone(), now + Duration::hours(1));
        let b = Principal::with_expiry(id.clone(), now + Duration::hours(2));
        let c = Principal::new(id);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_principal_validity() {
        let now = Utc::now();
        let id = user("alice@example.com");
        assert!(Principal::new(id.clone()).is_valid(now));

        let bounded = Principal::with_expiry(id.clone(), now + Duration::minutes(5));
        assert!(bounded.is_valid(now));
        assert!(!bounded.is_valid(now + Duration::minutes(5)));
        assert!(!bounded.is_valid(now + Duration::minutes(6)));
    }

    #[test]
    fn test_principal_hash_by_id() {
        use std::collections::HashSet;

        let now = Utc::now();
        let id = PrincipalId::JitGroup(JitGroupId::new("prod", "web", "admins"));
        let mut set = HashSet::new();
        set.insert(Principal::with_expiry(id.clone(), now));
        assert!(set.contains(&Principal::new(id)));
    }
}
