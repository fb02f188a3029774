//! Provisions directory groups, memberships, and IAM role bindings.

use crate::checksum::BindingChecksum;
use crate::error::CatalogError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use stint_audit::{AuditEvent, AuditLog, AuditRecord, Severity};
use stint_auth::{GroupId, GroupMapping, JitGroupId, UserId};
use stint_directory::{
    DirectoryClient, GroupType, IamBinding, IamCondition, IamPolicy, ResourceManagerClient,
};
use stint_policy::{IamRoleBinding, JitGroupPolicy, Policy};

/// Idempotently materializes what a group's policy declares: the
/// backing directory group, the member's time-bounded membership, and
/// the IAM role bindings on the affected resources.
///
/// Convergence is detected through a checksum embedded in the group's
/// description; rewriting that description is the commit point, so an
/// interrupted run is retried by the next invocation.
pub struct Provisioner {
    mapping: GroupMapping,
    directory: Arc<dyn DirectoryClient>,
    resource_manager: Arc<dyn ResourceManagerClient>,
    audit: Arc<dyn AuditLog>,
}

impl Provisioner {
    pub fn new(
        mapping: GroupMapping,
        directory: Arc<dyn DirectoryClient>,
        resource_manager: Arc<dyn ResourceManagerClient>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            mapping,
            directory,
            resource_manager,
            audit,
        }
    }

    pub(crate) fn audit(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }

    /// Directory group that backs a group policy.
    pub fn provisioned_group_id(&self, policy: &JitGroupPolicy) -> GroupId {
        self.mapping.group_from_jit_group(&policy.id())
    }

    /// Provision a member's access: group, membership, and bindings.
    pub async fn provision_access(
        &self,
        policy: &Arc<JitGroupPolicy>,
        member: &UserId,
        expiry: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        self.provision_group(policy, member, expiry).await?;
        self.provision_bindings(&self.provisioned_group_id(policy), policy)
            .await
    }

    /// Re-converge a group's bindings with its policy, independent of
    /// any user.
    pub async fn reconcile(&self, policy: &Arc<JitGroupPolicy>) -> Result<(), CatalogError> {
        self.provision_bindings(&self.provisioned_group_id(policy), policy)
            .await
    }

    /// All groups of an environment that this provisioner is
    /// authoritative for, whether or not a policy still exists.
    pub async fn provisioned_groups(
        &self,
        environment: &str,
    ) -> Result<Vec<JitGroupId>, CatalogError> {
        let prefix = self.mapping.environment_prefix(environment);
        let groups = self.directory.search_groups(&prefix).await?;
        Ok(groups
            .into_iter()
            .filter_map(|g| self.mapping.jit_group_from_group(&g.id).ok())
            .collect())
    }

    /// Create the backing group if missing and add the member's
    /// temporary membership.
    async fn provision_group(
        &self,
        policy: &Arc<JitGroupPolicy>,
        member: &UserId,
        expiry: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        let id = policy.id();
        let group_id = self.provisioned_group_id(policy);
        let display_name = format!(
            "JIT Group {} \u{203a} {} \u{203a} {}",
            id.environment(),
            id.system(),
            id.name()
        );

        let result: Result<(), CatalogError> = async {
            let key = self
                .directory
                .create_group(
                    &group_id,
                    GroupType::Security,
                    &display_name,
                    policy.description(),
                )
                .await?;
            self.directory.add_membership(&key, member, expiry).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.audit
                    .record(
                        AuditRecord::new(
                            AuditEvent::ProvisionMember,
                            Severity::Info,
                            format!("added {} to {} with expiry {}", member, group_id, expiry),
                        )
                        .with_user(member.clone())
                        .with_group(id.to_string())
                        .with_environment(id.environment()),
                    )
                    .await
                    .ok();
                Ok(())
            }
            Err(e) => {
                self.audit
                    .record(
                        AuditRecord::new(
                            AuditEvent::ProvisionMember,
                            Severity::Error,
                            format!("adding {} to {} failed: {}", member, group_id, e),
                        )
                        .with_user(member.clone())
                        .with_group(id.to_string()),
                    )
                    .await
                    .ok();
                Err(e)
            }
        }
    }

    /// Provision the group's IAM role bindings, but only if they have
    /// changed since the last successful provisioning.
    async fn provision_bindings(
        &self,
        group_id: &GroupId,
        policy: &Arc<JitGroupPolicy>,
    ) -> Result<(), CatalogError> {
        // Duplicate declarations collapse to one binding.
        let bindings: HashSet<&IamRoleBinding> = policy
            .privileges()
            .iter()
            .filter_map(|p| p.as_iam_role_binding())
            .collect();

        let group = self.directory.get_group(group_id).await?;
        let expected = BindingChecksum::from_bindings(bindings.iter().copied());
        let actual = BindingChecksum::from_tagged_description(&group.description);
        if expected == actual {
            // The bindings provisioned previously are still current.
            return Ok(());
        }

        self.audit
            .record(
                AuditRecord::new(
                    AuditEvent::ProvisionIamBindings,
                    Severity::Info,
                    format!(
                        "bindings for {} changed (expected checksum {}, found {}), provisioning",
                        group_id, expected, actual
                    ),
                )
                .with_group(policy.id().to_string()),
            )
            .await
            .ok();

        // Group bindings by resource; each resource's policy is
        // replaced atomically through read-modify-write.
        let mut per_resource: BTreeMap<_, Vec<&IamRoleBinding>> = BTreeMap::new();
        for binding in &bindings {
            per_resource
                .entry(binding.resource().clone())
                .or_default()
                .push(binding);
        }

        let member = format!("group:{}", group_id.email());
        let result: Result<(), CatalogError> = async {
            for (resource, resource_bindings) in &per_resource {
                self.resource_manager
                    .modify_iam_policy(
                        resource,
                        &|policy: &mut IamPolicy| {
                            replace_bindings_for_member(policy, &member, resource_bindings)
                        },
                        "Provisioning stint group",
                    )
                    .await?;
            }
            // Commit point: the tag records that everything above
            // succeeded. An interrupted run leaves the old tag, so the
            // next invocation detects the mismatch and retries.
            self.directory
                .patch_group(&group.key, &expected.tag_description(&group.description))
                .await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.audit
                    .record(
                        AuditRecord::new(
                            AuditEvent::ProvisionIamBindings,
                            Severity::Info,
                            format!("bindings for {} provisioned ({})", group_id, expected),
                        )
                        .with_group(policy.id().to_string()),
                    )
                    .await
                    .ok();
                Ok(())
            }
            Err(e) => {
                self.audit
                    .record(
                        AuditRecord::new(
                            AuditEvent::ProvisionIamBindings,
                            Severity::Error,
                            format!("provisioning bindings for {} failed: {}", group_id, e),
                        )
                        .with_group(policy.id().to_string()),
                    )
                    .await
                    .ok();
                Err(e)
            }
        }
    }
}

/// Replace the member's bindings within an IAM policy: drop the member
/// from every existing binding, purge bindings left without members,
/// and append the new bindings.
fn replace_bindings_for_member(policy: &mut IamPolicy, member: &str, bindings: &[&IamRoleBinding]) {
    for existing in &mut policy.bindings {
        existing.members.retain(|m| m != member);
    }
    policy.bindings.retain(|b| !b.members.is_empty());

    for binding in bindings {
        let condition = binding.condition().map(|expression| IamCondition {
            title: binding
                .description()
                .filter(|d| !d.is_empty())
                .unwrap_or("-")
                .to_string(),
            expression: expression.to_string(),
        });
        policy.bindings.push(IamBinding {
            role: binding.role().to_string(),
            members: vec![member.to_string()],
            condition,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stint_directory::ResourceId;

    fn binding(role: &str) -> IamRoleBinding {
        IamRoleBinding::new(ResourceId::new("project", "acme-prod"), role)
    }

    #[test]
    fn test_replace_drops_member_and_purges_empty_bindings() {
        let mut policy = IamPolicy {
            bindings: vec![
                IamBinding {
                    role: "roles/owner".to_string(),
                    members: vec![
                        "group:jit.prod.web.admins@example.com".to_string(),
                        "user:alice@example.com".to_string(),
                    ],
                    condition: None,
                },
                IamBinding {
                    role: "roles/editor".to_string(),
                    members: vec!["group:jit.prod.web.admins@example.com".to_string()],
                    condition: None,
                },
            ],
            etag: String::new(),
        };

        let new = binding("roles/viewer");
        replace_bindings_for_member(
            &mut policy,
            "group:jit.prod.web.admins@example.com",
            &[&new],
        );

        // The owner binding keeps its other member, the editor binding
        // is purged, the viewer binding is added.
        assert_eq!(policy.bindings.len(), 2);
        assert_eq!(policy.bindings[0].role, "roles/owner");
        assert_eq!(policy.bindings[0].members, vec!["user:alice@example.com"]);
        assert_eq!(policy.bindings[1].role, "roles/viewer");
    }

    #[test]
    fn test_replace_keeps_foreign_bindings() {
        let mut policy = IamPolicy {
            bindings: vec![IamBinding {
                role: "roles/owner".to_string(),
                members: vec!["user:admin@example.com".to_string()],
                condition: None,
            }],
            etag: String::new(),
        };

        let new = binding("roles/viewer");
        replace_bindings_for_member(&mut policy, "group:g@example.com", &[&new]);
        assert_eq!(policy.bindings.len(), 2);
    }

    #[test]
    fn test_condition_carries_description_as_title() {
        let mut policy = IamPolicy::default();
        let conditional = binding("roles/viewer")
            .with_description("time bound")
            .with_condition("request.time < timestamp('2030-01-01T00:00:00Z')");
        replace_bindings_for_member(&mut policy, "group:g@example.com", &[&conditional]);

        let condition = policy.bindings[0].condition.as_ref().unwrap();
        assert_eq!(condition.title, "time bound");
        assert!(condition.expression.contains("2030"));
    }

    #[test]
    fn test_condition_title_defaults_to_dash() {
        let mut policy = IamPolicy::default();
        let conditional = binding("roles/viewer").with_condition("true");
        replace_bindings_for_member(&mut policy, "group:g@example.com", &[&conditional]);
        assert_eq!(policy.bindings[0].condition.as_ref().unwrap().title, "-");
    }
}
