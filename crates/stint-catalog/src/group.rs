//! A group in the context of a specific subject, and the join
//! operation state machine.

use crate::environment::Environment;
use crate::error::CatalogError;
use chrono::Utc;
use std::sync::Arc;
use stint_audit::{AuditEvent, AuditRecord, Severity};
use stint_auth::{GroupId, JitGroupId, Principal, PrincipalId, Subject, UserId};
use stint_policy::{
    AccessOptions, AnalysisResult, ConstraintClass, JitGroupPolicy, PolicyAnalysis, PolicyError,
    PolicyPermission, Property,
};

/// Whether and how the subject can join a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinStatus {
    /// The subject holds an active membership.
    Joined,
    /// The subject cannot join, regardless of inputs.
    JoinDisallowed,
    /// The subject can request to join, pending approval.
    JoinAllowedWithApproval,
    /// The subject can join and self-approve.
    JoinAllowedWithoutApproval,
}

/// A group viewed by a subject that holds VIEW access.
pub struct JitGroupView {
    environment: Arc<Environment>,
    policy: Arc<JitGroupPolicy>,
    subject: Arc<Subject>,
}

impl JitGroupView {
    pub(crate) fn new(
        environment: Arc<Environment>,
        policy: Arc<JitGroupPolicy>,
        subject: Arc<Subject>,
    ) -> Self {
        Self {
            environment,
            policy,
            subject,
        }
    }

    pub fn policy(&self) -> &Arc<JitGroupPolicy> {
        &self.policy
    }

    pub fn id(&self) -> JitGroupId {
        self.policy.id()
    }

    /// Directory group that backs this group.
    pub fn directory_group_id(&self) -> GroupId {
        self.environment.provisioner().provisioned_group_id(&self.policy)
    }

    /// Start a join operation.
    ///
    /// The self-approval branch is probed first: if the subject holds
    /// JOIN and APPROVE_SELF (constraints ignored), the operation
    /// carries both the join and approval constraints. Otherwise the
    /// operation requires approval and carries the join constraints
    /// only.
    pub fn join(&self) -> JoinOperation {
        let self_approval = self
            .policy
            .analyze(
                Arc::clone(&self.subject),
                PolicyPermission::JOIN | PolicyPermission::APPROVE_SELF,
            )
            .apply_constraints(ConstraintClass::Join)
            .apply_constraints(ConstraintClass::Approve);
        if self_approval
            .execute()
            .is_access_allowed(AccessOptions::IgnoreConstraints)
        {
            return JoinOperation {
                environment: Arc::clone(&self.environment),
                requires_approval: false,
                analysis: self_approval,
            };
        }

        // The subject can't self-approve; they may still join with
        // somebody else's approval.
        JoinOperation {
            environment: Arc::clone(&self.environment),
            requires_approval: true,
            analysis: self
                .policy
                .analyze(Arc::clone(&self.subject), PolicyPermission::JOIN)
                .apply_constraints(ConstraintClass::Join),
        }
    }

    /// Summarize the subject's standing with respect to this group.
    pub fn status(&self) -> JoinStatus {
        let operation = self.join();
        let result = operation.dry_run();
        if result.active_membership().is_some() {
            JoinStatus::Joined
        } else if !result.is_access_allowed(AccessOptions::IgnoreConstraints) {
            JoinStatus::JoinDisallowed
        } else if operation.requires_approval() {
            JoinStatus::JoinAllowedWithApproval
        } else {
            JoinStatus::JoinAllowedWithoutApproval
        }
    }
}

/// A pending join of one subject to one group.
///
/// The operation starts out either self-approvable or requiring
/// approval (see [`JitGroupView::join`]). Inputs are bound through
/// [`Self::input`]; [`Self::dry_run`] re-evaluates without side
/// effects, and [`Self::execute`] provisions access.
pub struct JoinOperation {
    environment: Arc<Environment>,
    requires_approval: bool,
    analysis: PolicyAnalysis,
}

impl JoinOperation {
    pub fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    pub fn user(&self) -> &UserId {
        self.analysis.subject().user()
    }

    pub fn group(&self) -> JitGroupId {
        self.analysis.policy().id()
    }

    /// Input properties required to evaluate the constraints.
    pub fn input(&self) -> &[Arc<Property>] {
        self.analysis.input()
    }

    /// Re-run the analysis with the current inputs. Side-effect free
    /// and repeatable.
    pub fn dry_run(&self) -> AnalysisResult {
        self.analysis.execute()
    }

    /// Perform the join: verify the analysis, derive the expiry, and
    /// provision access. Only valid for self-approvable operations.
    pub async fn execute(&self) -> Result<Principal, CatalogError> {
        if self.requires_approval {
            return Err(CatalogError::ApprovalRequired);
        }

        let result = self.analysis.execute();
        result.verify_access_allowed(AccessOptions::Default)?;

        // Extract the expiry, which is fixed or user-provided. All
        // constraints are satisfied at this point, so an absent
        // duration means the policy declares no expiry constraint.
        let group_id = self.group();
        let duration = result
            .satisfied()
            .iter()
            .filter_map(|c| c.as_expiry())
            .find_map(|c| c.extract_expiry(result.input()))
            .ok_or_else(|| {
                CatalogError::Policy(PolicyError::MissingExpiryConstraint(group_id.to_string()))
            })?;
        let expiry = Utc::now() + duration;

        self.environment
            .provisioner()
            .provision_access(self.analysis.policy(), self.user(), expiry)
            .await?;

        self.environment
            .provisioner()
            .audit()
            .record(
                AuditRecord::new(
                    AuditEvent::JoinExecute,
                    Severity::Info,
                    format!("{} joined {} until {}", self.user(), group_id, expiry),
                )
                .with_user(self.user().clone())
                .with_group(group_id.to_string())
                .with_environment(group_id.environment()),
            )
            .await
            .ok();

        Ok(Principal::with_expiry(
            PrincipalId::JitGroup(group_id),
            expiry,
        ))
    }

    /// Verify that the operation can be handed to approvers: it must
    /// require approval and satisfy its join constraints with the
    /// current inputs.
    pub fn verify_delegation(&self) -> Result<(), CatalogError> {
        if !self.requires_approval {
            return Err(CatalogError::ApprovalNotRequired);
        }
        self.analysis
            .execute()
            .verify_access_allowed(AccessOptions::Default)?;
        Ok(())
    }
}
