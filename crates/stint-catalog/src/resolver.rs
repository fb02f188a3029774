//! Builds subjects by expanding a user into their principal set.

use crate::error::CatalogError;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use stint_audit::{AuditEvent, AuditLog, AuditRecord, Severity};
use stint_auth::{GroupMapping, Principal, PrincipalId, Subject, UserId};
use stint_directory::{DirectoryClient, DirectoryError, MembershipSummary};

/// Default bound on concurrent membership lookups per resolution.
const DEFAULT_FANOUT: usize = 8;

/// Resolves a user into a [`Subject`]: the user, their directory
/// groups, and their active stint group memberships with expiries.
pub struct SubjectResolver {
    directory: Arc<dyn DirectoryClient>,
    mapping: GroupMapping,
    audit: Arc<dyn AuditLog>,
    fanout: usize,
}

impl SubjectResolver {
    pub fn new(
        directory: Arc<dyn DirectoryClient>,
        mapping: GroupMapping,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            directory,
            mapping,
            audit,
            fanout: DEFAULT_FANOUT,
        }
    }

    /// Cap the number of concurrent membership lookups.
    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout.max(1);
        self
    }

    /// Build a subject for a user.
    ///
    /// A failure to list the user's memberships fails the resolution.
    /// Failures of individual membership lookups do not: a vanished
    /// membership is skipped, and so is a group that looks like a stint
    /// group but lacks an expiry.
    pub async fn resolve(&self, user: &UserId) -> Result<Subject, CatalogError> {
        let memberships = self.directory.list_memberships_by_user(user).await?;

        // Split into stint groups, which need an expiry lookup, and
        // other groups, which are usable as-is.
        let (jit, other): (Vec<MembershipSummary>, Vec<MembershipSummary>) = memberships
            .into_iter()
            .partition(|m| self.mapping.is_jit_group(&m.group));

        let mut principals: Vec<Principal> = other
            .into_iter()
            .map(|m| Principal::new(PrincipalId::Group(m.group)))
            .collect();

        let jit_count = jit.len();
        let lookups: Vec<_> = stream::iter(jit)
            .map(|summary| {
                let directory = Arc::clone(&self.directory);
                async move {
                    let details = directory.get_membership(&summary.membership).await;
                    (summary, details)
                }
            })
            .buffer_unordered(self.fanout)
            .collect()
            .await;

        let mut resolved = 0usize;
        for (summary, details) in lookups {
            match details {
                Ok(membership) => {
                    debug_assert_eq!(membership.member, *user);
                    match membership.earliest_expiry() {
                        Some(expiry) => {
                            let id = self
                                .mapping
                                .jit_group_from_group(&summary.group)
                                .expect("listed group matched the naming scheme");
                            principals
                                .push(Principal::with_expiry(PrincipalId::JitGroup(id), expiry));
                            resolved += 1;
                        }
                        None => {
                            // Somebody created a group that merely fits
                            // the naming convention.
                            self.warn(
                                user,
                                format!(
                                    "the group '{}' looks like a stint group but lacks an expiry",
                                    summary.group
                                ),
                            )
                            .await;
                        }
                    }
                }
                Err(DirectoryError::NotFound) => {
                    // Membership expired between listing and lookup.
                    self.warn(
                        user,
                        format!("the membership in '{}' no longer exists", summary.group),
                    )
                    .await;
                }
                Err(e) => {
                    self.audit
                        .record(
                            AuditRecord::new(
                                AuditEvent::SubjectResolution,
                                Severity::Error,
                                format!(
                                    "resolving the membership in '{}' failed: {}",
                                    summary.group, e
                                ),
                            )
                            .with_user(user.clone()),
                        )
                        .await
                        .ok();
                }
            }
        }

        self.audit
            .record(
                AuditRecord::new(
                    AuditEvent::SubjectResolution,
                    Severity::Info,
                    format!(
                        "resolved {} of {} stint group memberships and {} other groups",
                        resolved,
                        jit_count,
                        principals.len().saturating_sub(resolved)
                    ),
                )
                .with_user(user.clone()),
            )
            .await
            .ok();

        Ok(Subject::new(user.clone(), principals))
    }

    async fn warn(&self, user: &UserId, message: String) {
        self.audit
            .record(
                AuditRecord::new(AuditEvent::SubjectResolution, Severity::Warning, message)
                    .with_user(user.clone()),
            )
            .await
            .ok();
    }
}

/// A subject that resolves lazily, at most once per request.
///
/// Concurrent accessors coalesce into a single resolution; a failed
/// resolution is not cached and the next access retries.
pub struct LazySubject {
    user: UserId,
    resolver: Arc<SubjectResolver>,
    cell: tokio::sync::OnceCell<Arc<Subject>>,
}

impl LazySubject {
    pub fn new(resolver: Arc<SubjectResolver>, user: UserId) -> Self {
        Self {
            user,
            resolver,
            cell: tokio::sync::OnceCell::new(),
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub async fn get(&self) -> Result<Arc<Subject>, CatalogError> {
        self.cell
            .get_or_try_init(|| async {
                self.resolver.resolve(&self.user).await.map(Arc::new)
            })
            .await
            .cloned()
    }
}
