//! The three-level policy tree.

use crate::acl::AccessControlList;
use crate::constraint::Constraint;
use crate::error::PolicyError;
use crate::permission::PolicyPermission;
use crate::privilege::Privilege;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, LazyLock, OnceLock, RwLock, Weak};
use stint_auth::{JitGroupId, Subject};

static ENVIRONMENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-zA-Z0-9-]{1,16}$").expect("valid pattern"));
static CHILD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-zA-Z0-9_-]{1,32}$").expect("valid pattern"));

/// Which operation a constraint applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstraintClass {
    /// Checked when a user requests to join.
    Join,
    /// Checked when a join is approved (including self-approval).
    Approve,
}

impl ConstraintClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintClass::Join => "JOIN",
            ConstraintClass::Approve => "APPROVE",
        }
    }
}

impl FromStr for ConstraintClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JOIN" => Ok(ConstraintClass::Join),
            "APPROVE" => Ok(ConstraintClass::Approve),
            other => Err(format!("invalid constraint class: {}", other)),
        }
    }
}

/// Map of constraints per class, in declared order.
pub type ConstraintMap = BTreeMap<ConstraintClass, Vec<Arc<Constraint>>>;

/// Provenance of a policy: where it was loaded from and when it last
/// changed. Nodes without their own metadata inherit their parent's.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub source: String,
    pub last_modified: DateTime<Utc>,
}

/// Common behavior of all policy tree nodes.
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// The node's own ACL. Absent means everybody is allowed at this
    /// node; an empty list means nobody is.
    fn acl(&self) -> Option<&AccessControlList>;

    /// Constraints declared on this node only (no inheritance).
    fn own_constraints(&self, class: ConstraintClass) -> &[Arc<Constraint>];

    fn parent(&self) -> Option<Arc<dyn Policy>>;

    fn own_metadata(&self) -> Option<&Metadata> {
        None
    }

    /// Metadata, falling back to the closest ancestor that has some.
    fn metadata(&self) -> Option<Metadata> {
        if let Some(m) = self.own_metadata() {
            return Some(m.clone());
        }
        let mut current = self.parent();
        while let Some(node) = current {
            if let Some(m) = node.own_metadata() {
                return Some(m.clone());
            }
            current = node.parent();
        }
        None
    }

    /// Whether the node's ACL and every ancestor's ACL allow the
    /// requested permissions. Each node is evaluated independently;
    /// a missing ACL contributes allow-all.
    fn is_allowed_by_acl(&self, subject: &Subject, mask: PolicyPermission) -> bool {
        let allowed_here = self
            .acl()
            .map(|acl| acl.is_allowed(subject, mask))
            .unwrap_or(true);
        if !allowed_here {
            return false;
        }
        match self.parent() {
            Some(parent) => parent.is_allowed_by_acl(subject, mask),
            None => true,
        }
    }

    /// Constraints of a class, including inherited ones. A child
    /// constraint shadows a parent constraint with the same name;
    /// otherwise the union is returned, child first.
    fn effective_constraints(&self, class: ConstraintClass) -> Vec<Arc<Constraint>> {
        let mut result = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for constraint in self.own_constraints(class) {
            if seen.insert(constraint.name().to_string()) {
                result.push(Arc::clone(constraint));
            }
        }
        let mut current = self.parent();
        while let Some(node) = current {
            for constraint in node.own_constraints(class) {
                if seen.insert(constraint.name().to_string()) {
                    result.push(Arc::clone(constraint));
                }
            }
            current = node.parent();
        }
        result
    }
}

/// Write-once link from a child node to its parent.
///
/// The parent owns its children; the back-reference is weak so the
/// tree stays acyclic by construction.
#[derive(Debug, Default)]
struct ParentLink(OnceLock<Weak<dyn Policy>>);

impl ParentLink {
    fn set(&self, child: *const (), parent: Arc<dyn Policy>) -> Result<(), PolicyError> {
        if std::ptr::addr_eq(Arc::as_ptr(&parent), child) {
            return Err(PolicyError::SelfParent);
        }
        self.0
            .set(Arc::downgrade(&parent))
            .map_err(|_| PolicyError::ParentAlreadySet)
    }

    fn get(&self) -> Option<Arc<dyn Policy>> {
        self.0.get().and_then(Weak::upgrade)
    }
}

fn validate_environment_name(name: &str) -> Result<(), PolicyError> {
    if ENVIRONMENT_NAME.is_match(name) {
        Ok(())
    } else {
        Err(PolicyError::InvalidName {
            name: name.to_string(),
            reason: "environment names consist of up to 16 letters, digits, and hyphens"
                .to_string(),
        })
    }
}

fn validate_child_name(name: &str) -> Result<(), PolicyError> {
    if CHILD_NAME.is_match(name) {
        Ok(())
    } else {
        Err(PolicyError::InvalidName {
            name: name.to_string(),
            reason:
                "system and group names consist of up to 32 letters, digits, hyphens, and underscores"
                    .to_string(),
        })
    }
}

/// Policy for an environment: a set of systems managed together,
/// typically because they share a lifecycle ("prod" vs "dev") or belong
/// to the same part of the organization.
#[derive(Debug)]
pub struct EnvironmentPolicy {
    name: String,
    description: String,
    acl: Option<AccessControlList>,
    constraints: ConstraintMap,
    metadata: Metadata,
    systems: RwLock<BTreeMap<String, Arc<SystemPolicy>>>,
}

impl EnvironmentPolicy {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        acl: Option<AccessControlList>,
        constraints: ConstraintMap,
        metadata: Metadata,
    ) -> Result<Self, PolicyError> {
        let name = name.into();
        validate_environment_name(&name)?;
        Ok(Self {
            name,
            description: description.into(),
            acl,
            constraints,
            metadata,
            systems: RwLock::new(BTreeMap::new()),
        })
    }

    /// Attach a system. Fails on a duplicate name or a system that
    /// already has a parent.
    pub fn add_system(
        self: &Arc<Self>,
        system: Arc<SystemPolicy>,
    ) -> Result<(), PolicyError> {
        let mut systems = self.systems.write().expect("policy tree lock poisoned");
        if systems.contains_key(system.name()) {
            return Err(PolicyError::DuplicateChild(system.name().to_string()));
        }
        system.parent.set(
            Arc::as_ptr(&system) as *const (),
            Arc::clone(self) as Arc<dyn Policy>,
        )?;
        systems.insert(system.name().to_string(), system);
        Ok(())
    }

    /// Systems, ordered by name.
    pub fn systems(&self) -> Vec<Arc<SystemPolicy>> {
        self.systems
            .read()
            .expect("policy tree lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn system(&self, name: &str) -> Option<Arc<SystemPolicy>> {
        self.systems
            .read()
            .expect("policy tree lock poisoned")
            .get(name)
            .cloned()
    }
}

impl Policy for EnvironmentPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn acl(&self) -> Option<&AccessControlList> {
        self.acl.as_ref()
    }

    fn own_constraints(&self, class: ConstraintClass) -> &[Arc<Constraint>] {
        self.constraints.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    fn parent(&self) -> Option<Arc<dyn Policy>> {
        None
    }

    fn own_metadata(&self) -> Option<&Metadata> {
        Some(&self.metadata)
    }
}

/// Policy for a system: a set of related groups within an environment.
#[derive(Debug)]
pub struct SystemPolicy {
    name: String,
    description: String,
    acl: Option<AccessControlList>,
    constraints: ConstraintMap,
    parent: ParentLink,
    groups: RwLock<BTreeMap<String, Arc<JitGroupPolicy>>>,
}

impl SystemPolicy {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        acl: Option<AccessControlList>,
        constraints: ConstraintMap,
    ) -> Result<Self, PolicyError> {
        let name = name.into();
        validate_child_name(&name)?;
        Ok(Self {
            name,
            description: description.into(),
            acl,
            constraints,
            parent: ParentLink::default(),
            groups: RwLock::new(BTreeMap::new()),
        })
    }

    /// Attach a group. Fails on a duplicate name or a group that
    /// already has a parent.
    pub fn add_group(
        self: &Arc<Self>,
        group: Arc<JitGroupPolicy>,
    ) -> Result<(), PolicyError> {
        let mut groups = self.groups.write().expect("policy tree lock poisoned");
        if groups.contains_key(group.name()) {
            return Err(PolicyError::DuplicateChild(group.name().to_string()));
        }
        group.parent.set(
            Arc::as_ptr(&group) as *const (),
            Arc::clone(self) as Arc<dyn Policy>,
        )?;
        groups.insert(group.name().to_string(), group);
        Ok(())
    }

    /// Groups, ordered by name.
    pub fn groups(&self) -> Vec<Arc<JitGroupPolicy>> {
        self.groups
            .read()
            .expect("policy tree lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn group(&self, name: &str) -> Option<Arc<JitGroupPolicy>> {
        self.groups
            .read()
            .expect("policy tree lock poisoned")
            .get(name)
            .cloned()
    }
}

impl Policy for SystemPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn acl(&self) -> Option<&AccessControlList> {
        self.acl.as_ref()
    }

    fn own_constraints(&self, class: ConstraintClass) -> &[Arc<Constraint>] {
        self.constraints.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    fn parent(&self) -> Option<Arc<dyn Policy>> {
        self.parent.get()
    }
}

/// Policy for a group: the unit a user joins. Carries the privileges
/// membership confers.
#[derive(Debug)]
pub struct JitGroupPolicy {
    name: String,
    description: String,
    acl: Option<AccessControlList>,
    constraints: ConstraintMap,
    privileges: Vec<Privilege>,
    parent: ParentLink,
}

impl JitGroupPolicy {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        acl: Option<AccessControlList>,
        constraints: ConstraintMap,
        privileges: Vec<Privilege>,
    ) -> Result<Self, PolicyError> {
        let name = name.into();
        validate_child_name(&name)?;
        Ok(Self {
            name,
            description: description.into(),
            acl,
            constraints,
            privileges,
            parent: ParentLink::default(),
        })
    }

    /// Fully qualified id, derived from the ancestor names.
    ///
    /// The group must be attached to a system and environment.
    pub fn id(&self) -> JitGroupId {
        let system = self
            .parent()
            .expect("group policy is attached to a system");
        let environment = system
            .parent()
            .expect("system policy is attached to an environment");
        JitGroupId::new(environment.name(), system.name(), self.name())
    }

    pub fn privileges(&self) -> &[Privilege] {
        &self.privileges
    }
}

impl Policy for JitGroupPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn acl(&self) -> Option<&AccessControlList> {
        self.acl.as_ref()
    }

    fn own_constraints(&self, class: ConstraintClass) -> &[Arc<Constraint>] {
        self.constraints.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    fn parent(&self) -> Option<Arc<dyn Policy>> {
        self.parent.get()
    }
}
