//! Permissions that access control lists grant on policies.

use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// Permission mask evaluated against a policy node's ACL.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PolicyPermission: u32 {
        /// See that the policy exists and read its details.
        const VIEW           = 1 << 0;
        /// Request to join a group.
        const JOIN           = 1 << 1;
        /// Approve one's own join request.
        const APPROVE_SELF   = 1 << 2;
        /// Approve other users' join requests. Reserved for the
        /// approval-pickup flow; no join transition consumes it.
        const APPROVE_OTHERS = 1 << 3;
        /// Export an environment's policy document.
        const EXPORT         = 1 << 4;
        /// Trigger reconciliation of an environment.
        const RECONCILE      = 1 << 5;
    }
}

impl PolicyPermission {
    pub fn as_str(&self) -> &'static str {
        match self.bits() {
            b if b == Self::VIEW.bits() => "VIEW",
            b if b == Self::JOIN.bits() => "JOIN",
            b if b == Self::APPROVE_SELF.bits() => "APPROVE_SELF",
            b if b == Self::APPROVE_OTHERS.bits() => "APPROVE_OTHERS",
            b if b == Self::EXPORT.bits() => "EXPORT",
            b if b == Self::RECONCILE.bits() => "RECONCILE",
            _ => "(combination)",
        }
    }
}

impl fmt::Display for PolicyPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|p| p.as_str()).collect();
        write!(f, "{}", names.join("|"))
    }
}

impl FromStr for PolicyPermission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VIEW" => Ok(PolicyPermission::VIEW),
            "JOIN" => Ok(PolicyPermission::JOIN),
            "APPROVE_SELF" => Ok(PolicyPermission::APPROVE_SELF),
            "APPROVE_OTHERS" => Ok(PolicyPermission::APPROVE_OTHERS),
            "EXPORT" => Ok(PolicyPermission::EXPORT),
            "RECONCILE" => Ok(PolicyPermission::RECONCILE),
            other => Err(format!("invalid permission: {}", other)),
        }
    }
}
