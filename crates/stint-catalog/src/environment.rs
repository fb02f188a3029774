//! Subject-scoped views over environments and systems.

use crate::error::CatalogError;
use crate::group::JitGroupView;
use crate::provision::Provisioner;
use std::sync::Arc;
use stint_audit::{AuditEvent, AuditRecord, Severity};
use stint_auth::{JitGroupId, Subject};
use stint_policy::{
    AccessOptions, EnvironmentPolicy, PolicyDocument, PolicyPermission, SystemPolicy,
};
use stint_policy::Policy as _;

/// A loaded environment: its policy document paired with the
/// provisioner that materializes it.
pub struct Environment {
    document: PolicyDocument,
    provisioner: Arc<Provisioner>,
}

impl Environment {
    pub fn new(document: PolicyDocument, provisioner: Arc<Provisioner>) -> Self {
        Self {
            document,
            provisioner,
        }
    }

    pub fn policy(&self) -> &Arc<EnvironmentPolicy> {
        self.document.policy()
    }

    pub fn document(&self) -> &PolicyDocument {
        &self.document
    }

    pub fn provisioner(&self) -> &Arc<Provisioner> {
        &self.provisioner
    }
}

/// An environment in the context of a specific subject.
pub struct EnvironmentView {
    environment: Arc<Environment>,
    subject: Arc<Subject>,
}

impl EnvironmentView {
    pub(crate) fn new(environment: Arc<Environment>, subject: Arc<Subject>) -> Self {
        Self {
            environment,
            subject,
        }
    }

    pub fn policy(&self) -> &Arc<EnvironmentPolicy> {
        self.environment.policy()
    }

    /// Whether the subject may export the policy document.
    pub fn can_export(&self) -> bool {
        self.policy()
            .is_allowed_by_acl(&self.subject, PolicyPermission::EXPORT)
    }

    /// Export the policy document. Requires EXPORT access.
    pub fn export(&self) -> Option<PolicyDocument> {
        self.can_export()
            .then(|| self.environment.document().clone())
    }

    /// Whether the subject may reconcile the environment.
    pub fn can_reconcile(&self) -> bool {
        self.policy()
            .is_allowed_by_acl(&self.subject, PolicyPermission::RECONCILE)
    }

    /// Reconcile every group the provisioner is authoritative for and
    /// report the resulting compliance. Requires RECONCILE access.
    pub async fn reconcile(&self) -> Result<Option<Vec<GroupCompliance>>, CatalogError> {
        if !self.can_reconcile() {
            return Ok(None);
        }

        let provisioner = self.environment.provisioner();
        let mut results = Vec::new();
        for group_id in provisioner
            .provisioned_groups(self.policy().name())
            .await?
        {
            let policy = self
                .policy()
                .system(group_id.system())
                .and_then(|sys| sys.group(group_id.name()));
            let compliance = match policy {
                // The group exists but no policy declares it.
                None => GroupCompliance::orphaned(group_id),
                Some(policy) => match provisioner.reconcile(&policy).await {
                    Ok(()) => GroupCompliance::compliant(group_id),
                    Err(e) => GroupCompliance::non_compliant(group_id, e),
                },
            };
            results.push(compliance);
        }

        let compliant = results.iter().filter(|c| c.is_compliant()).count();
        provisioner
            .audit()
            .record(
                AuditRecord::new(
                    AuditEvent::Reconcile,
                    Severity::Info,
                    format!(
                        "reconciled environment: {} of {} groups compliant",
                        compliant,
                        results.len()
                    ),
                )
                .with_environment(self.policy().name())
                .with_user(self.subject.user().clone()),
            )
            .await
            .ok();

        Ok(Some(results))
    }

    /// Systems the subject has VIEW access to, ordered by name.
    pub fn systems(&self) -> Vec<SystemView> {
        self.environment
            .policy()
            .systems()
            .into_iter()
            .filter(|sys| sys.is_allowed_by_acl(&self.subject, PolicyPermission::VIEW))
            .map(|sys| SystemView::new(Arc::clone(&self.environment), sys, Arc::clone(&self.subject)))
            .collect()
    }

    /// A system by name. Requires VIEW access.
    pub fn system(&self, name: &str) -> Option<SystemView> {
        self.environment
            .policy()
            .system(name)
            .filter(|sys| sys.is_allowed_by_acl(&self.subject, PolicyPermission::VIEW))
            .map(|sys| SystemView::new(Arc::clone(&self.environment), sys, Arc::clone(&self.subject)))
    }
}

/// A system in the context of a specific subject.
pub struct SystemView {
    environment: Arc<Environment>,
    system: Arc<SystemPolicy>,
    subject: Arc<Subject>,
}

impl SystemView {
    pub(crate) fn new(
        environment: Arc<Environment>,
        system: Arc<SystemPolicy>,
        subject: Arc<Subject>,
    ) -> Self {
        Self {
            environment,
            system,
            subject,
        }
    }

    pub fn policy(&self) -> &Arc<SystemPolicy> {
        &self.system
    }

    /// Groups the subject has VIEW access to, ordered by id.
    pub fn groups(&self) -> Vec<JitGroupView> {
        self.system
            .groups()
            .into_iter()
            .filter(|grp| {
                grp.analyze(Arc::clone(&self.subject), PolicyPermission::VIEW)
                    .execute()
                    .is_access_allowed(AccessOptions::Default)
            })
            .map(|grp| JitGroupView::new(Arc::clone(&self.environment), grp, Arc::clone(&self.subject)))
            .collect()
    }

    /// A group by name. Requires VIEW access.
    pub fn group(&self, name: &str) -> Option<JitGroupView> {
        self.system
            .group(name)
            .filter(|grp| {
                grp.analyze(Arc::clone(&self.subject), PolicyPermission::VIEW)
                    .execute()
                    .is_access_allowed(AccessOptions::Default)
            })
            .map(|grp| JitGroupView::new(Arc::clone(&self.environment), grp, Arc::clone(&self.subject)))
    }
}

/// Compliance of one provisioned group after reconciliation.
#[derive(Debug)]
pub struct GroupCompliance {
    group: JitGroupId,
    state: ComplianceState,
}

/// Outcome of reconciling one group. The failure keeps the structured
/// error so callers can render or classify it.
#[derive(Debug)]
enum ComplianceState {
    Compliant,
    Orphaned,
    NonCompliant(CatalogError),
}

impl GroupCompliance {
    fn compliant(group: JitGroupId) -> Self {
        Self {
            group,
            state: ComplianceState::Compliant,
        }
    }

    fn orphaned(group: JitGroupId) -> Self {
        Self {
            group,
            state: ComplianceState::Orphaned,
        }
    }

    fn non_compliant(group: JitGroupId, error: CatalogError) -> Self {
        Self {
            group,
            state: ComplianceState::NonCompliant(error),
        }
    }

    pub fn group(&self) -> &JitGroupId {
        &self.group
    }

    pub fn is_compliant(&self) -> bool {
        matches!(self.state, ComplianceState::Compliant)
    }

    /// The group exists in the directory but no policy declares it.
    pub fn is_orphaned(&self) -> bool {
        matches!(self.state, ComplianceState::Orphaned)
    }

    /// The error that kept the group from converging, if any.
    pub fn error(&self) -> Option<&CatalogError> {
        match &self.state {
            ComplianceState::NonCompliant(e) => Some(e),
            _ => None,
        }
    }
}
