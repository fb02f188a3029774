//! Privileges conferred by group membership.

use crc32fast::Hasher as Crc32;
use stint_directory::ResourceId;

/// A privilege attached to a group. Membership in the group confers
/// every privilege the group's policy declares.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Privilege {
    IamRoleBinding(IamRoleBinding),
}

impl Privilege {
    pub fn as_iam_role_binding(&self) -> Option<&IamRoleBinding> {
        match self {
            Privilege::IamRoleBinding(b) => Some(b),
        }
    }
}

/// An IAM role on a resource, granted to the group's members.
///
/// Equality considers all fields; two bindings that differ in any field
/// are provisioned independently.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IamRoleBinding {
    resource: ResourceId,
    role: String,
    description: Option<String>,
    condition: Option<String>,
}

impl IamRoleBinding {
    pub fn new(resource: ResourceId, role: impl Into<String>) -> Self {
        Self {
            resource,
            role: role.into(),
            description: None,
            condition: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// Stable 32-bit checksum over all fields, used for idempotent
    /// reconciliation. Stable across processes and releases.
    pub fn checksum(&self) -> u32 {
        let mut hasher = Crc32::new();
        hasher.update(self.resource.kind().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.resource.value().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.role.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.description.as_deref().unwrap_or_default().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.condition.as_deref().unwrap_or_default().as_bytes());
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding() -> IamRoleBinding {
        IamRoleBinding::new(ResourceId::new("project", "acme-prod"), "roles/viewer")
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(binding().checksum(), binding().checksum());
    }

    #[test]
    fn test_checksum_differs_per_field() {
        let base = binding();
        let other_role =
            IamRoleBinding::new(ResourceId::new("project", "acme-prod"), "roles/editor");
        let other_resource =
            IamRoleBinding::new(ResourceId::new("project", "acme-dev"), "roles/viewer");
        let with_condition = binding().with_condition("request.time < timestamp('2030-01-01')");
        let with_description = binding().with_description("read-only access");

        assert_ne!(base.checksum(), other_role.checksum());
        assert_ne!(base.checksum(), other_resource.checksum());
        assert_ne!(base.checksum(), with_condition.checksum());
        assert_ne!(base.checksum(), with_description.checksum());
    }

    #[test]
    fn test_equality_considers_all_fields() {
        assert_eq!(binding(), binding());
        assert_ne!(binding(), binding().with_description("x"));
        assert_ne!(binding(), binding().with_condition("true"));
    }
}
