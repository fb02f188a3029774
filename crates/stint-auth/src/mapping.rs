//! Mapping between stint group ids and the directory groups backing them.

use crate::ids::{GroupId, IdError, JitGroupId};

/// Prefix that marks a directory group as managed by stint.
const GROUP_PREFIX: &str = "jit";

/// Deterministic mapping between [`JitGroupId`]s and the email addresses
/// of the directory groups that back them, under a configured domain.
///
/// `prod.web.admins` maps to `jit.prod.web.admins@<domain>`.
#[derive(Clone, Debug)]
pub struct GroupMapping {
    domain: String,
}

impl GroupMapping {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into().to_lowercase(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Directory group that backs a stint group.
    pub fn group_from_jit_group(&self, id: &JitGroupId) -> GroupId {
        GroupId::new(format!(
            "{}.{}.{}.{}@{}",
            GROUP_PREFIX,
            id.environment(),
            id.system(),
            id.name(),
            self.domain
        ))
        .expect("mapped group email is well-formed")
    }

    /// Whether a directory group follows the naming scheme for groups
    /// managed by stint.
    pub fn is_jit_group(&self, group: &GroupId) -> bool {
        self.jit_group_from_group(group).is_ok()
    }

    /// Reverse mapping. Fails for groups outside the managed naming
    /// scheme or domain.
    pub fn jit_group_from_group(&self, group: &GroupId) -> Result<JitGroupId, IdError> {
        if group.domain() != self.domain {
            return Err(IdError::InvalidJitGroup(group.to_string()));
        }
        match group.local_part().split_once('.') {
            Some((GROUP_PREFIX, rest)) => rest.parse(),
            _ => Err(IdError::InvalidJitGroup(group.to_string())),
        }
    }

    /// Email prefix shared by all managed groups of an environment,
    /// usable as a directory search query.
    pub fn environment_prefix(&self, environment: &str) -> String {
        format!("{}.{}.", GROUP_PREFIX, environment.to_lowercase())
    }
}
