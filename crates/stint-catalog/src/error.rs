//! Error type for catalog operations.

use stint_directory::{DirectoryError, TokenError};
use stint_policy::PolicyError;
use thiserror::Error;

/// Message shown at the API boundary for denials and missing resources.
///
/// Both collapse to one message so callers can't probe for the
/// existence of policies they are not allowed to see.
pub const PUBLIC_DENIAL_MESSAGE: &str = "the resource does not exist or access is denied";

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Policy evaluation denied the operation, or the policy model
    /// rejected an input.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// A collaborator call failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Deferral token signing or verification failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// `execute` was called on a join that requires approval.
    #[error("the join operation requires approval")]
    ApprovalRequired,

    /// `defer` was called on a join that does not require approval.
    #[error("the join operation does not require approval")]
    ApprovalNotRequired,

    /// A deferral needs at least one assignee.
    #[error("at least one assignee must be provided")]
    NoAssignees,

    /// The loaded policy does not match the configured environment.
    #[error("the policy name '{actual}' does not match the environment '{expected}'")]
    EnvironmentMismatch { expected: String, actual: String },
}

impl CatalogError {
    /// Whether the error should be collapsed into
    /// [`PUBLIC_DENIAL_MESSAGE`] at the API boundary.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            CatalogError::Policy(PolicyError::AccessDenied { .. })
                | CatalogError::Directory(DirectoryError::NotFound)
                | CatalogError::Directory(DirectoryError::AccessDenied(_))
                | CatalogError::ApprovalRequired
        )
    }

    /// Message suitable for returning to callers.
    pub fn public_message(&self) -> String {
        if self.is_denial() {
            PUBLIC_DENIAL_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}
