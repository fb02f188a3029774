//! Policy model and evaluation engine for stint.
//!
//! A policy is a three-level tree (environment, system, group). Each node
//! carries an optional access control list and a set of named constraints;
//! children inherit both. [`PolicyAnalysis`] combines the ACL decision,
//! constraint checks, and user-supplied inputs into a single result that
//! the join pipeline acts on.
//!
//! Policy evaluation outcomes are data, not errors: a constraint that
//! evaluates to `false` lands in the unsatisfied list, and only
//! infrastructure failures travel on the error channel.

pub mod acl;
pub mod analysis;
pub mod constraint;
pub mod doc;
pub mod error;
pub mod expiry;
pub mod expression;
pub mod permission;
pub mod policy;
pub mod privilege;
pub mod property;

pub use acl::{AccessControlEntry, AccessControlList};
pub use analysis::{AccessOptions, AnalysisResult, PolicyAnalysis};
pub use constraint::{Check, Constraint, ConstraintError};
pub use doc::{PolicyDocument, PolicyHeader, PolicyIssue, PolicyParser};
pub use error::PolicyError;
pub use expiry::ExpiryConstraint;
pub use expression::ExpressionConstraint;
pub use permission::PolicyPermission;
pub use policy::{
    ConstraintClass, ConstraintMap, EnvironmentPolicy, JitGroupPolicy, Metadata, Policy,
    SystemPolicy,
};
pub use privilege::{IamRoleBinding, Privilege};
pub use property::{Property, PropertyKind, PropertySpec, PropertyValue};
