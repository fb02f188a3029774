//! Hands a pending join to approvers as a signed token.

use crate::error::CatalogError;
use crate::group::JoinOperation;
use std::collections::BTreeMap;
use std::sync::Arc;
use stint_audit::{AuditEvent, AuditLog, AuditRecord, Severity};
use stint_auth::UserId;
use stint_directory::{SignedToken, TokenError, TokenSigner};

mod claims {
    pub const AUDIENCE: &str = "aud";
    pub const GROUP: &str = "grp";
    pub const USER: &str = "usr";
    pub const INPUT: &str = "inp";
}

/// Encodes pending joins as signed tokens and decodes them back.
pub struct Deferrer {
    signer: Arc<dyn TokenSigner>,
    audit: Arc<dyn AuditLog>,
}

impl Deferrer {
    pub fn new(signer: Arc<dyn TokenSigner>, audit: Arc<dyn AuditLog>) -> Self {
        Self { signer, audit }
    }

    /// Encode a join operation into a token addressed to the given
    /// assignees. The operation must require approval and satisfy its
    /// join constraints.
    pub async fn defer(
        &self,
        operation: &JoinOperation,
        assignees: &[UserId],
    ) -> Result<SignedToken, CatalogError> {
        if assignees.is_empty() {
            return Err(CatalogError::NoAssignees);
        }
        operation.verify_delegation()?;

        let mut audience: Vec<String> =
            assignees.iter().map(|a| a.email().to_string()).collect();
        audience.sort();
        audience.dedup();

        // Unset inputs are omitted from the payload.
        let mut input = serde_json::Map::new();
        for property in operation.input() {
            if let Some(value) = property.get() {
                input.insert(
                    property.name().to_string(),
                    serde_json::Value::String(value.serialize()),
                );
            }
        }

        let payload = serde_json::json!({
            claims::AUDIENCE: audience,
            claims::GROUP: operation.group().to_string(),
            claims::USER: operation.user().email(),
            claims::INPUT: input,
        });

        let token = self.signer.sign(&payload).await?;

        self.audit
            .record(
                AuditRecord::new(
                    AuditEvent::JoinDefer,
                    Severity::Info,
                    format!(
                        "{} deferred joining {} to {} approver(s)",
                        operation.user(),
                        operation.group(),
                        audience.len()
                    ),
                )
                .with_user(operation.user().clone())
                .with_group(operation.group().to_string()),
            )
            .await
            .ok();

        Ok(token)
    }

    /// Verify a token and return the deferred join it carries.
    ///
    /// A signature failure surfaces as a token error; it must not be
    /// mistaken for an access-control denial.
    pub async fn pickup(&self, token: &str) -> Result<Deferral, CatalogError> {
        let payload = self.signer.verify(token).await?;

        let deferrer = payload
            .get(claims::USER)
            .and_then(serde_json::Value::as_str)
            .and_then(|email| UserId::new(email).ok())
            .ok_or(TokenError::Malformed)?;

        let assignees = payload
            .get(claims::AUDIENCE)
            .and_then(serde_json::Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .and_then(|email| UserId::new(email).ok())
                            .ok_or(TokenError::Malformed)
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .ok_or(TokenError::Malformed)??;
        if assignees.is_empty() {
            return Err(TokenError::Malformed.into());
        }

        let input = payload
            .get(claims::INPUT)
            .and_then(serde_json::Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(name, value)| {
                        value
                            .as_str()
                            .map(|v| (name.clone(), v.to_string()))
                            .ok_or(TokenError::Malformed)
                    })
                    .collect::<Result<BTreeMap<_, _>, _>>()
            })
            .ok_or(TokenError::Malformed)??;

        let group = payload
            .get(claims::GROUP)
            .and_then(serde_json::Value::as_str)
            .ok_or(TokenError::Malformed)?
            .to_string();

        self.audit
            .record(
                AuditRecord::new(
                    AuditEvent::JoinPickup,
                    Severity::Info,
                    format!("picked up a deferred join of {} to {}", deferrer, group),
                )
                .with_user(deferrer.clone())
                .with_group(group.clone()),
            )
            .await
            .ok();

        Ok(Deferral {
            deferrer,
            assignees,
            group,
            input,
        })
    }
}

/// A deferred join, as decoded from a token.
#[derive(Clone, Debug)]
pub struct Deferral {
    deferrer: UserId,
    assignees: Vec<UserId>,
    group: String,
    input: BTreeMap<String, String>,
}

impl Deferral {
    /// User that initiated the deferral.
    pub fn deferrer(&self) -> &UserId {
        &self.deferrer
    }

    /// Users the operation was deferred to, sorted.
    pub fn assignees(&self) -> &[UserId] {
        &self.assignees
    }

    /// Canonical id of the target group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Inputs provided by the deferring user.
    pub fn input(&self) -> &BTreeMap<String, String> {
        &self.input
    }

    /// Bind the deferred inputs onto another join operation, typically
    /// one the approver opened on the same group.
    pub fn apply_input(&self, operation: &JoinOperation) -> Result<(), CatalogError> {
        for property in operation.input() {
            if let Some(value) = self.input.get(property.name()) {
                property.set(value)?;
            }
        }
        Ok(())
    }
}
