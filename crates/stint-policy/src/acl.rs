//! Ordered access control lists.

use crate::permission::PolicyPermission;
use stint_auth::{PrincipalId, Subject};

/// One entry of an access control list.
///
/// An entry matches a subject when the subject carries the entry's
/// principal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessControlEntry {
    Allow {
        principal: PrincipalId,
        mask: PolicyPermission,
    },
    Deny {
        principal: PrincipalId,
        mask: PolicyPermission,
    },
}

impl AccessControlEntry {
    pub fn allow(principal: PrincipalId, mask: PolicyPermission) -> Self {
        AccessControlEntry::Allow { principal, mask }
    }

    pub fn deny(principal: PrincipalId, mask: PolicyPermission) -> Self {
        AccessControlEntry::Deny { principal, mask }
    }
}

/// An ordered sequence of allow and deny entries.
///
/// A list with no entries grants access to nobody; a policy node without
/// any list grants access to everybody (that distinction is handled by
/// the node, which stores `Option<AccessControlList>`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessControlList {
    entries: Vec<AccessControlEntry>,
}

impl AccessControlList {
    pub fn new(entries: Vec<AccessControlEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[AccessControlEntry] {
        &self.entries
    }

    /// Evaluate the list for a subject requesting `requested`.
    ///
    /// Entries are traversed in declared order. Any matching deny whose
    /// mask intersects the request denies outright; otherwise the union
    /// of matching allow masks must cover the full request.
    pub fn is_allowed(&self, subject: &Subject, requested: PolicyPermission) -> bool {
        let mut granted = PolicyPermission::empty();
        for entry in &self.entries {
            match entry {
                AccessControlEntry::Deny { principal, mask }
                    if subject.has(principal) && mask.intersects(requested) =>
                {
                    return false;
                }
                AccessControlEntry::Allow { principal, mask } if subject.has(principal) => {
                    granted |= *mask;
                }
                _ => {}
            }
        }
        granted.contains(requested)
    }
}
