//! Error type for policy construction and verification.

use crate::constraint::ConstraintError;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum PolicyError {
    /// The subject lacks a required permission on the policy or one of
    /// its ancestors.
    #[error("access to '{policy}' is denied")]
    AccessDenied { policy: String },

    /// A property value failed to parse or fell outside its range, or a
    /// required property was missing.
    #[error("invalid value for property '{property}': {reason}")]
    InvalidInput { property: String, reason: String },

    /// One or more constraints evaluated to false.
    #[error("constraints not satisfied: {}", constraints.join(", "))]
    ConstraintUnsatisfied { constraints: Vec<String> },

    /// One or more constraints failed to evaluate. This is an internal
    /// condition, distinct from an unsatisfied constraint.
    #[error("constraint evaluation failed")]
    ConstraintFailed { causes: Vec<ConstraintError> },

    /// A policy name violates the naming rules for its level.
    #[error("invalid policy name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A constraint expression failed to compile.
    #[error("invalid expression in constraint '{constraint}': {reason}")]
    InvalidExpression { constraint: String, reason: String },

    /// An expiry constraint was declared with an empty or inverted range.
    #[error("invalid expiry range: {0}")]
    InvalidExpiryRange(String),

    #[error("a nested policy named '{0}' has already been added")]
    DuplicateChild(String),

    #[error("the parent has been set already")]
    ParentAlreadySet,

    #[error("a policy must not be its own parent")]
    SelfParent,

    /// No expiry constraint applies to the group, so no membership
    /// expiry can be derived.
    #[error("the group '{0}' does not specify an expiry constraint")]
    MissingExpiryConstraint(String),
}
