//! The authenticated subject that policy evaluation runs against.

use crate::ids::{ClassId, UserId};
use crate::principal::{Principal, PrincipalId};
use std::collections::HashMap;

/// An authenticated user together with all principals they carry into
/// policy evaluation: the user itself, their directory groups, their
/// active stint group memberships, and the authenticated-users class.
///
/// The user is always a member of its own principal set.
#[derive(Clone, Debug)]
pub struct Subject {
    user: UserId,
    principals: HashMap<PrincipalId, Principal>,
}

impl Subject {
    /// Build a subject. The user principal and the authenticated-users
    /// class are added if missing.
    pub fn new(user: UserId, principals: impl IntoIterator<Item = Principal>) -> Self {
        let mut map: HashMap<PrincipalId, Principal> = principals
            .into_iter()
            .map(|p| (p.id().clone(), p))
            .collect();
        map.entry(PrincipalId::User(user.clone()))
            .or_insert_with(|| Principal::new(PrincipalId::User(user.clone())));
        map.entry(PrincipalId::Class(ClassId::AuthenticatedUsers))
            .or_insert_with(|| Principal::new(PrincipalId::Class(ClassId::AuthenticatedUsers)));
        Self {
            user,
            principals: map,
        }
    }

    /// A subject that carries nothing beyond the user itself and the
    /// authenticated-users class.
    pub fn bare(user: UserId) -> Self {
        Self::new(user, [])
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn principals(&self) -> impl Iterator<Item = &Principal> {
        self.principals.values()
    }

    /// Whether the subject carries the given principal.
    pub fn has(&self, id: &PrincipalId) -> bool {
        self.principals.contains_key(id)
    }

    /// Look up one of the subject's principals.
    pub fn principal(&self, id: &PrincipalId) -> Option<&Principal> {
        self.principals.get(id)
    }
}
