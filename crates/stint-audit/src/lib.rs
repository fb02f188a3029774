//! Audit logging abstraction for stint.
//!
//! This crate defines the [`AuditLog`] trait for recording auditable
//! actions and the stable event names used as the `event` field in
//! structured logs. A tracing-backed implementation is included; other
//! backends (persistent stores, external sinks) implement the trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stint_auth::UserId;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for an audit record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditRecordId(pub Uuid);

impl AuditRecordId {
    /// Generate a new record ID using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Auditable actions, with stable dotted names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    SubjectResolution,
    LoadEnvironment,
    JoinExecute,
    JoinDefer,
    JoinPickup,
    ProvisionMember,
    ProvisionIamBindings,
    Reconcile,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::SubjectResolution => "catalog.resolve_subject",
            AuditEvent::LoadEnvironment => "catalog.load_environment",
            AuditEvent::JoinExecute => "catalog.join_execute",
            AuditEvent::JoinDefer => "catalog.join_defer",
            AuditEvent::JoinPickup => "catalog.join_pickup",
            AuditEvent::ProvisionMember => "catalog.provision_member",
            AuditEvent::ProvisionIamBindings => "catalog.provision_iam_bindings",
            AuditEvent::Reconcile => "catalog.reconcile",
        }
    }
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AuditEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "catalog.resolve_subject" => Ok(AuditEvent::SubjectResolution),
            "catalog.load_environment" => Ok(AuditEvent::LoadEnvironment),
            "catalog.join_execute" => Ok(AuditEvent::JoinExecute),
            "catalog.join_defer" => Ok(AuditEvent::JoinDefer),
            "catalog.join_pickup" => Ok(AuditEvent::JoinPickup),
            "catalog.provision_member" => Ok(AuditEvent::ProvisionMember),
            "catalog.provision_iam_bindings" => Ok(AuditEvent::ProvisionIamBindings),
            "catalog.reconcile" => Ok(AuditEvent::Reconcile),
            other => Err(format!("unknown audit event: {}", other)),
        }
    }
}

/// Severity of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One auditable occurrence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditRecordId,
    pub time: DateTime<Utc>,
    pub event: AuditEvent,
    pub severity: Severity,
    pub user: Option<UserId>,
    pub environment: Option<String>,
    pub group: Option<String>,
    pub message: String,
}

impl AuditRecord {
    pub fn new(event: AuditEvent, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: AuditRecordId::new(),
            time: Utc::now(),
            event,
            severity,
            user: None,
            environment: None,
            group: None,
            message: message.into(),
        }
    }

    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Error type for audit sinks.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("backend error: {0}")]
    Backend(String),
}

/// Sink for audit records.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Audit sink that emits structured tracing events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditLog;

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let user = record.user.as_ref().map(|u| u.email().to_string());
        match record.severity {
            Severity::Info => tracing::info!(
                event = record.event.as_str(),
                user_id = user.as_deref(),
                environment = record.environment.as_deref(),
                group = record.group.as_deref(),
                "{}",
                record.message
            ),
            Severity::Warning => tracing::warn!(
                event = record.event.as_str(),
                user_id = user.as_deref(),
                environment = record.environment.as_deref(),
                group = record.group.as_deref(),
                "{}",
                record.message
            ),
            Severity::Error => tracing::error!(
                event = record.event.as_str(),
                user_id = user.as_deref(),
                environment = record.environment.as_deref(),
                group = record.group.as_deref(),
                "{}",
                record.message
            ),
        }
        Ok(())
    }
}
