//! The collaborator traits that backends implement.

use crate::types::*;
use crate::{DirectoryError, TokenError};
use chrono::{DateTime, Utc};
use stint_auth::{GroupId, UserId};

/// Identity-provider client: groups and memberships.
#[async_trait::async_trait]
pub trait DirectoryClient: Send + Sync {
    /// List the user's direct group memberships. Role details (and with
    /// them, expiries) are not included; use [`Self::get_membership`].
    async fn list_memberships_by_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<MembershipSummary>, DirectoryError>;

    /// Fetch the details of one membership.
    async fn get_membership(&self, id: &MembershipId) -> Result<Membership, DirectoryError>;

    /// Create a group if it doesn't exist yet. Returns the key of the
    /// existing group otherwise (creation is idempotent).
    async fn create_group(
        &self,
        id: &GroupId,
        group_type: GroupType,
        display_name: &str,
        description: &str,
    ) -> Result<GroupKey, DirectoryError>;

    /// Add or update a user's time-bounded membership in a group.
    async fn add_membership(
        &self,
        group: &GroupKey,
        user: &UserId,
        expiry: DateTime<Utc>,
    ) -> Result<(), DirectoryError>;

    /// Look up a group by its email address.
    async fn get_group(&self, id: &GroupId) -> Result<Group, DirectoryError>;

    /// Replace a group's description.
    async fn patch_group(&self, key: &GroupKey, description: &str) -> Result<(), DirectoryError>;

    /// List groups whose email address starts with the given prefix.
    async fn search_groups(&self, prefix: &str) -> Result<Vec<Group>, DirectoryError>;
}

/// Mutation applied to an IAM policy inside a read-modify-write cycle.
///
/// The callback may run more than once if the write loses an optimistic
/// concurrency race and the implementation retries with a fresh read.
pub type IamPolicyMutation<'a> = &'a (dyn Fn(&mut IamPolicy) + Send + Sync);

/// Resource-manager client: IAM policies on resources.
#[async_trait::async_trait]
pub trait ResourceManagerClient: Send + Sync {
    /// Read the resource's IAM policy, apply the mutation, and write the
    /// result back, honoring the backend's optimistic concurrency. The
    /// replacement is atomic per resource. Implementations retry a
    /// bounded number of times on conflict before surfacing
    /// [`DirectoryError::Conflict`].
    async fn modify_iam_policy(
        &self,
        resource: &ResourceId,
        mutation: IamPolicyMutation<'_>,
        rationale: &str,
    ) -> Result<(), DirectoryError>;
}

/// Signer for deferral tokens.
#[async_trait::async_trait]
pub trait TokenSigner: Send + Sync {
    /// Sign a payload, returning the token and its expiry.
    async fn sign(&self, payload: &serde_json::Value) -> Result<SignedToken, TokenError>;

    /// Verify a token and return its payload verbatim.
    async fn verify(&self, token: &str) -> Result<serde_json::Value, TokenError>;
}
