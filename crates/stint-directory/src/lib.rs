//! Collaborator contracts for stint.
//!
//! The service keeps no state of its own: groups and memberships live in
//! an identity provider, role bindings live in a resource manager, and
//! deferral tokens are signed by an external signer. This crate defines
//! the traits those collaborators implement (e.g.
//! `stint-directory-memory` for tests and local runs) so the catalog
//! doesn't depend on any specific backend SDK.

use thiserror::Error;

pub mod client;
pub mod types;

pub use client::{DirectoryClient, IamPolicyMutation, ResourceManagerClient, TokenSigner};
pub use types::*;

/// Uniform error type for directory and resource-manager backends.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The group, membership, or resource does not exist (or vanished
    /// between listing and lookup).
    #[error("not found")]
    NotFound,
    /// The backend rejected the caller's credentials or permissions.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// Optimistic concurrency was exhausted; the caller may retry.
    #[error("conflicting concurrent update")]
    Conflict,
    /// I/O failure talking to the backend, underlying cause preserved.
    #[error("transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Error type for token signing and verification.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token's signature did not verify, or the token expired.
    /// Distinct from any access-control decision.
    #[error("token verification failed")]
    Verification,
    /// The token could not be parsed at all.
    #[error("malformed token")]
    Malformed,
    #[error("signing failed: {0}")]
    Signing(String),
}
