//! Policy documents and the loading contract.
//!
//! Parsing the document format itself is a collaborator concern; this
//! module only defines the contract and the types exchanged across it.

use crate::error::PolicyError;
use crate::policy::{EnvironmentPolicy, Metadata, Policy};
use std::fmt;
use std::sync::Arc;

/// Bare identification of an environment policy, available without
/// loading the full policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyHeader {
    pub name: String,
    pub description: String,
}

/// A loaded environment policy together with its canonical source text.
#[derive(Clone)]
pub struct PolicyDocument {
    policy: Arc<EnvironmentPolicy>,
    text: String,
}

impl PolicyDocument {
    pub fn new(policy: Arc<EnvironmentPolicy>, text: impl Into<String>) -> Self {
        Self {
            policy,
            text: text.into(),
        }
    }

    pub fn policy(&self) -> &Arc<EnvironmentPolicy> {
        &self.policy
    }

    /// Canonical document text, as exported to callers with EXPORT
    /// access.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> Metadata {
        self.policy
            .metadata()
            .expect("environment policies carry metadata")
    }
}

impl fmt::Debug for PolicyDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyDocument")
            .field("policy", &self.policy.name())
            .finish()
    }
}

/// One finding produced while parsing a policy document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyIssue {
    /// Whether the issue prevents the document from being used.
    pub error: bool,
    /// Stable issue code, e.g. `acl.unknown-principal`.
    pub code: String,
    pub details: String,
}

/// Contract for the external policy-document parser.
pub trait PolicyParser: Send + Sync {
    /// Parse a document into an environment policy. Non-fatal findings
    /// are returned alongside; fatal ones fail the parse.
    fn parse(
        &self,
        text: &str,
        metadata: Metadata,
    ) -> Result<(PolicyDocument, Vec<PolicyIssue>), PolicyError>;
}
