//! Policy analysis: ACL decision, constraint checks, and inputs,
//! combined into one result.

use crate::constraint::{Check, Constraint, ConstraintError};
use crate::error::PolicyError;
use crate::permission::PolicyPermission;
use crate::policy::{ConstraintClass, JitGroupPolicy, Policy};
use crate::property::Property;
use chrono::Utc;
use std::sync::Arc;
use stint_auth::{Principal, PrincipalId, Subject};

/// How constraint state factors into the access decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessOptions {
    /// Access requires the ACL to allow and all constraints to be
    /// satisfied.
    Default,
    /// Access requires only the ACL to allow. Used to probe whether a
    /// subject could ever perform an operation, regardless of inputs.
    IgnoreConstraints,
}

/// Analysis of whether a subject may perform an operation on a group,
/// built from the subject, the requested permissions, and the
/// constraint classes applied so far.
pub struct PolicyAnalysis {
    policy: Arc<JitGroupPolicy>,
    subject: Arc<Subject>,
    permissions: PolicyPermission,
    checks: Vec<Check>,
    input: Vec<Arc<Property>>,
}

impl JitGroupPolicy {
    /// Start an analysis for a subject requesting the given
    /// permissions. Apply constraint classes before executing.
    pub fn analyze(
        self: &Arc<Self>,
        subject: Arc<Subject>,
        permissions: PolicyPermission,
    ) -> PolicyAnalysis {
        PolicyAnalysis {
            policy: Arc::clone(self),
            subject,
            permissions,
            checks: Vec::new(),
            input: Vec::new(),
        }
    }
}

impl PolicyAnalysis {
    /// Apply the effective constraints of a class. Inputs with the same
    /// name across constraints share one property instance.
    pub fn apply_constraints(mut self, class: ConstraintClass) -> Self {
        for constraint in self.policy.effective_constraints(class) {
            let mut check = constraint.new_check();
            for index in 0..check.input().len() {
                let name = check.input()[index].name().to_string();
                match self.input.iter().find(|p| p.name() == name) {
                    Some(shared) => check.replace_input(index, Arc::clone(shared)),
                    None => self.input.push(Arc::clone(&check.input()[index])),
                }
            }
            check.set_context(
                "subject",
                serde_json::json!({ "email": self.subject.user().email() }),
            );
            self.checks.push(check);
        }
        self
    }

    pub fn policy(&self) -> &Arc<JitGroupPolicy> {
        &self.policy
    }

    pub fn subject(&self) -> &Arc<Subject> {
        &self.subject
    }

    /// Union of the inputs required by all applied constraints.
    pub fn input(&self) -> &[Arc<Property>] {
        &self.input
    }

    /// Run the ACL check and all applied constraint checks against the
    /// inputs bound at call time. Side-effect free and repeatable.
    pub fn execute(&self) -> AnalysisResult {
        let access_allowed = self
            .policy
            .is_allowed_by_acl(&self.subject, self.permissions);

        let mut satisfied = Vec::new();
        let mut unsatisfied = Vec::new();
        let mut failed = Vec::new();
        for check in &self.checks {
            match check.execute() {
                Ok(true) => satisfied.push(Arc::clone(check.constraint())),
                Ok(false) => unsatisfied.push(Arc::clone(check.constraint())),
                Err(e) => failed.push((Arc::clone(check.constraint()), e)),
            }
        }

        let now = Utc::now();
        let active_membership = self
            .subject
            .principal(&PrincipalId::JitGroup(self.policy.id()))
            .filter(|p| p.is_valid(now))
            .cloned();

        AnalysisResult {
            policy_id: self.policy.id().to_string(),
            access_allowed,
            satisfied,
            unsatisfied,
            failed,
            input: self.input.clone(),
            active_membership,
        }
    }
}

/// Outcome of one analysis execution.
#[derive(Debug)]
pub struct AnalysisResult {
    policy_id: String,
    access_allowed: bool,
    satisfied: Vec<Arc<Constraint>>,
    unsatisfied: Vec<Arc<Constraint>>,
    failed: Vec<(Arc<Constraint>, ConstraintError)>,
    input: Vec<Arc<Property>>,
    active_membership: Option<Principal>,
}

impl AnalysisResult {
    pub fn satisfied(&self) -> &[Arc<Constraint>] {
        &self.satisfied
    }

    pub fn unsatisfied(&self) -> &[Arc<Constraint>] {
        &self.unsatisfied
    }

    pub fn failed(&self) -> &[(Arc<Constraint>, ConstraintError)] {
        &self.failed
    }

    pub fn input(&self) -> &[Arc<Property>] {
        &self.input
    }

    /// The subject's currently active membership of the group, if any.
    pub fn active_membership(&self) -> Option<&Principal> {
        self.active_membership.as_ref()
    }

    pub fn is_access_allowed(&self, options: AccessOptions) -> bool {
        match options {
            AccessOptions::Default => {
                self.access_allowed && self.unsatisfied.is_empty() && self.failed.is_empty()
            }
            AccessOptions::IgnoreConstraints => self.access_allowed,
        }
    }

    /// Like [`Self::is_access_allowed`], but reports why access is not
    /// allowed. The ACL decision is checked first, then failed
    /// constraints, then unsatisfied ones.
    pub fn verify_access_allowed(&self, options: AccessOptions) -> Result<(), PolicyError> {
        if !self.access_allowed {
            return Err(PolicyError::AccessDenied {
                policy: self.policy_id.clone(),
            });
        }
        if options == AccessOptions::IgnoreConstraints {
            return Ok(());
        }
        if !self.failed.is_empty() {
            return Err(PolicyError::ConstraintFailed {
                causes: self.failed.iter().map(|(_, e)| e.clone()).collect(),
            });
        }
        if !self.unsatisfied.is_empty() {
            return Err(PolicyError::ConstraintUnsatisfied {
                constraints: self
                    .unsatisfied
                    .iter()
                    .map(|c| c.display_name().to_string())
                    .collect(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{AccessControlEntry, AccessControlList};
    use crate::expiry::ExpiryConstraint;
    use crate::expression::ExpressionConstraint;
    use crate::policy::{ConstraintMap, EnvironmentPolicy, Metadata, SystemPolicy};
    use crate::property::{PropertyKind, PropertySpec};
    use chrono::Duration;
    use stint_auth::{JitGroupId, UserId};

    fn alice() -> Arc<Subject> {
        Arc::new(Subject::bare(UserId::new("alice@example.com").unwrap()))
    }

    fn allow_alice(mask: PolicyPermission) -> Option<AccessControlList> {
        Some(AccessControlList::new(vec![AccessControlEntry::allow(
            PrincipalId::User(UserId::new("alice@example.com").unwrap()),
            mask,
        )]))
    }

    fn build_group(
        acl: Option<AccessControlList>,
        constraints: ConstraintMap,
    ) -> Arc<JitGroupPolicy> {
        let env = Arc::new(
            EnvironmentPolicy::new(
                "prod",
                "",
                None,
                ConstraintMap::new(),
                Metadata {
                    source: "memory".to_string(),
                    last_modified: Utc::now(),
                },
            )
            .unwrap(),
        );
        let sys = Arc::new(SystemPolicy::new("web", "", None, ConstraintMap::new()).unwrap());
        let grp =
            Arc::new(JitGroupPolicy::new("admins", "", acl, constraints, vec![]).unwrap());
        env.add_system(Arc::clone(&sys)).unwrap();
        sys.add_group(Arc::clone(&grp)).unwrap();
        std::mem::forget(env);
        std::mem::forget(sys);
        grp
    }

    fn expression_constraints() -> ConstraintMap {
        ConstraintMap::from([(
            ConstraintClass::Join,
            vec![Arc::new(Constraint::Expression(
                ExpressionConstraint::new(
                    "var1-set",
                    "Variable 1",
                    "input.var1 == true",
                    vec![PropertySpec::new("var1", "Variable 1", PropertyKind::Bool).required()],
                )
                .unwrap(),
            ))],
        )])
    }

    #[test]
    fn test_acl_denied_subject_is_not_allowed() {
        let grp = build_group(allow_alice(PolicyPermission::VIEW), ConstraintMap::new());
        let result = grp
            .analyze(alice(), PolicyPermission::JOIN)
            .apply_constraints(ConstraintClass::Join)
            .execute();
        assert!(!result.is_access_allowed(AccessOptions::Default));
        assert!(!result.is_access_allowed(AccessOptions::IgnoreConstraints));
        assert!(matches!(
            result.verify_access_allowed(AccessOptions::Default),
            Err(PolicyError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_unsatisfied_constraint_blocks_default_but_not_probe() {
        let grp = build_group(allow_alice(PolicyPermission::JOIN), expression_constraints());
        let analysis = grp
            .analyze(alice(), PolicyPermission::JOIN)
            .apply_constraints(ConstraintClass::Join);

        analysis.input()[0].set("false").unwrap();
        let result = analysis.execute();
        assert!(!result.is_access_allowed(AccessOptions::Default));
        assert!(result.is_access_allowed(AccessOptions::IgnoreConstraints));
        assert_eq!(result.unsatisfied().len(), 1);
        assert!(matches!(
            result.verify_access_allowed(AccessOptions::Default),
            Err(PolicyError::ConstraintUnsatisfied { .. })
        ));
    }

    #[test]
    fn test_satisfied_constraint_allows() {
        let grp = build_group(allow_alice(PolicyPermission::JOIN), expression_constraints());
        let analysis = grp
            .analyze(alice(), PolicyPermission::JOIN)
            .apply_constraints(ConstraintClass::Join);

        analysis.input()[0].set("true").unwrap();
        let result = analysis.execute();
        assert!(result.is_access_allowed(AccessOptions::Default));
        assert_eq!(result.satisfied().len(), 1);
        result.verify_access_allowed(AccessOptions::Default).unwrap();
    }

    #[test]
    fn test_missing_input_lands_in_failed() {
        let grp = build_group(allow_alice(PolicyPermission::JOIN), expression_constraints());
        let result = grp
            .analyze(alice(), PolicyPermission::JOIN)
            .apply_constraints(ConstraintClass::Join)
            .execute();
        assert_eq!(result.failed().len(), 1);
        assert!(matches!(
            result.verify_access_allowed(AccessOptions::Default),
            Err(PolicyError::ConstraintFailed { .. })
        ));
    }

    #[test]
    fn test_execute_observes_inputs_at_call_time() {
        let grp = build_group(allow_alice(PolicyPermission::JOIN), expression_constraints());
        let analysis = grp
            .analyze(alice(), PolicyPermission::JOIN)
            .apply_constraints(ConstraintClass::Join);

        analysis.input()[0].set("false").unwrap();
        assert!(!analysis.execute().is_access_allowed(AccessOptions::Default));

        analysis.input()[0].set("true").unwrap();
        assert!(analysis.execute().is_access_allowed(AccessOptions::Default));
    }

    #[test]
    fn test_duplicate_input_names_share_one_property() {
        let make = |name: &str| {
            Arc::new(Constraint::Expression(
                ExpressionConstraint::new(
                    name,
                    name,
                    "input.ticket != ''",
                    vec![PropertySpec::new("ticket", "Ticket", PropertyKind::String)],
                )
                .unwrap(),
            ))
        };
        let constraints = ConstraintMap::from([(
            ConstraintClass::Join,
            vec![make("first"), make("second")],
        )]);
        let grp = build_group(allow_alice(PolicyPermission::JOIN), constraints);
        let analysis = grp
            .analyze(alice(), PolicyPermission::JOIN)
            .apply_constraints(ConstraintClass::Join);

        // One shared instance, set once, satisfies both constraints.
        assert_eq!(analysis.input().len(), 1);
        analysis.input()[0].set("T-123").unwrap();
        let result = analysis.execute();
        assert_eq!(result.satisfied().len(), 2);
    }

    #[test]
    fn test_no_classes_applied_checks_acl_only() {
        let grp = build_group(allow_alice(PolicyPermission::VIEW), expression_constraints());
        let result = grp.analyze(alice(), PolicyPermission::VIEW).execute();
        assert!(result.is_access_allowed(AccessOptions::Default));
        assert!(result.input().is_empty());
    }

    #[test]
    fn test_active_membership_is_reported() {
        let grp = build_group(allow_alice(PolicyPermission::VIEW), ConstraintMap::new());
        let expiry = Utc::now() + Duration::minutes(30);
        let subject = Arc::new(Subject::new(
            UserId::new("alice@example.com").unwrap(),
            [Principal::with_expiry(
                PrincipalId::JitGroup(JitGroupId::new("prod", "web", "admins")),
                expiry,
            )],
        ));

        let result = grp.analyze(subject, PolicyPermission::VIEW).execute();
        let membership = result.active_membership().unwrap();
        assert_eq!(membership.expiry(), Some(expiry));
    }

    #[test]
    fn test_expired_membership_is_not_active() {
        let grp = build_group(allow_alice(PolicyPermission::VIEW), ConstraintMap::new());
        let subject = Arc::new(Subject::new(
            UserId::new("alice@example.com").unwrap(),
            [Principal::with_expiry(
                PrincipalId::JitGroup(JitGroupId::new("prod", "web", "admins")),
                Utc::now() - Duration::minutes(1),
            )],
        ));

        let result = grp.analyze(subject, PolicyPermission::VIEW).execute();
        assert!(result.active_membership().is_none());
    }

    #[test]
    fn test_expiry_constraint_flows_through_analysis() {
        let constraints = ConstraintMap::from([(
            ConstraintClass::Join,
            vec![Arc::new(Constraint::Expiry(
                ExpiryConstraint::range(Duration::seconds(60), Duration::days(3)).unwrap(),
            ))],
        )]);
        let grp = build_group(allow_alice(PolicyPermission::JOIN), constraints);
        let analysis = grp
            .analyze(alice(), PolicyPermission::JOIN)
            .apply_constraints(ConstraintClass::Join);

        // Unset expiry: unsatisfied, not failed.
        let result = analysis.execute();
        assert_eq!(result.unsatisfied().len(), 1);
        assert!(result.failed().is_empty());

        analysis.input()[0].set("120").unwrap();
        let result = analysis.execute();
        assert_eq!(result.satisfied().len(), 1);
    }
}
