//! Environment loading and caching.

use crate::environment::Environment;
use crate::error::CatalogError;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use crate::provision::Provisioner;
use stint_audit::{AuditEvent, AuditLog, AuditRecord, Severity};
use stint_policy::{Metadata, Policy, PolicyHeader, PolicyParser};

/// Source of environments for a catalog.
#[async_trait::async_trait]
pub trait EnvironmentSource: Send + Sync {
    /// Headers of all available environments, without loading full
    /// policies.
    fn environments(&self) -> Vec<PolicyHeader>;

    /// Look up an environment by name. Unknown names and load failures
    /// both surface as absent.
    async fn lookup(&self, name: &str) -> Option<Arc<Environment>>;
}

/// Loads one environment from its backing source (a file, a secret, an
/// in-memory fixture).
#[async_trait::async_trait]
pub trait EnvironmentLoader: Send + Sync {
    async fn load(&self, name: &str) -> Result<Arc<Environment>, CatalogError>;
}

/// Reads the raw policy document text for an environment, from
/// whatever the configured locator points at.
#[async_trait::async_trait]
pub trait PolicyTextSource: Send + Sync {
    async fn read(&self, name: &str) -> Result<(String, Metadata), CatalogError>;
}

/// Provisioner to pair with a freshly loaded policy. Environments can
/// target different resource-manager scopes, so the provisioner is
/// produced per policy.
pub type ProvisionerFactory =
    dyn Fn(&Arc<stint_policy::EnvironmentPolicy>) -> Arc<Provisioner> + Send + Sync;

/// [`EnvironmentLoader`] that reads document text, runs it through the
/// external parser, and pairs the result with a provisioner.
///
/// Non-fatal validation findings are reported through the audit log;
/// fatal ones fail the load.
pub struct DocumentEnvironmentLoader {
    texts: Arc<dyn PolicyTextSource>,
    parser: Arc<dyn PolicyParser>,
    provisioners: Arc<ProvisionerFactory>,
    audit: Arc<dyn AuditLog>,
}

impl DocumentEnvironmentLoader {
    pub fn new(
        texts: Arc<dyn PolicyTextSource>,
        parser: Arc<dyn PolicyParser>,
        provisioners: Arc<ProvisionerFactory>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            texts,
            parser,
            provisioners,
            audit,
        }
    }
}

#[async_trait::async_trait]
impl EnvironmentLoader for DocumentEnvironmentLoader {
    async fn load(&self, name: &str) -> Result<Arc<Environment>, CatalogError> {
        let (text, metadata) = self.texts.read(name).await?;
        let (document, issues) = self.parser.parse(&text, metadata)?;

        for issue in issues {
            self.audit
                .record(
                    AuditRecord::new(
                        AuditEvent::LoadEnvironment,
                        Severity::Warning,
                        format!("policy finding {}: {}", issue.code, issue.details),
                    )
                    .with_environment(name),
                )
                .await
                .ok();
        }

        let provisioner = (self.provisioners)(document.policy());
        Ok(Arc::new(Environment::new(document, provisioner)))
    }
}

struct Slot {
    cell: Arc<tokio::sync::OnceCell<Arc<Environment>>>,
    loaded_at: Instant,
}

impl Slot {
    fn fresh() -> Self {
        Self {
            cell: Arc::new(tokio::sync::OnceCell::new()),
            loaded_at: Instant::now(),
        }
    }
}

/// A lazy, caching [`EnvironmentSource`].
///
/// Environments load on first lookup and are kept for the configured
/// time-to-live. Concurrent misses on the same name coalesce into one
/// load; load failures are reported and not cached, so the next lookup
/// retries.
pub struct CachedEnvironmentSource {
    names: BTreeSet<String>,
    loader: Arc<dyn EnvironmentLoader>,
    ttl: Duration,
    slots: DashMap<String, Slot>,
    audit: Arc<dyn AuditLog>,
}

impl CachedEnvironmentSource {
    pub fn new(
        names: impl IntoIterator<Item = String>,
        loader: Arc<dyn EnvironmentLoader>,
        ttl: Duration,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            names: names.into_iter().collect(),
            loader,
            ttl,
            slots: DashMap::new(),
            audit,
        }
    }

    fn slot(&self, name: &str) -> Arc<tokio::sync::OnceCell<Arc<Environment>>> {
        let mut entry = self
            .slots
            .entry(name.to_string())
            .or_insert_with(Slot::fresh);
        // Replace expired slots, but never one with a load in flight.
        if entry.loaded_at.elapsed() > self.ttl && entry.cell.initialized() {
            *entry = Slot::fresh();
        }
        Arc::clone(&entry.cell)
    }

    async fn report_failure(&self, name: &str, error: &CatalogError) {
        self.audit
            .record(
                AuditRecord::new(
                    AuditEvent::LoadEnvironment,
                    Severity::Error,
                    format!("loading the policy for environment '{}' failed: {}", name, error),
                )
                .with_environment(name),
            )
            .await
            .ok();
    }
}

#[async_trait::async_trait]
impl EnvironmentSource for CachedEnvironmentSource {
    fn environments(&self) -> Vec<PolicyHeader> {
        // Avoid loading policies just for names and descriptions.
        self.names
            .iter()
            .map(|name| PolicyHeader {
                name: name.clone(),
                description: name.clone(),
            })
            .collect()
    }

    async fn lookup(&self, name: &str) -> Option<Arc<Environment>> {
        if !self.names.contains(name) {
            return None;
        }

        let cell = self.slot(name);
        let loaded = cell
            .get_or_try_init(|| self.loader.load(name))
            .await
            .cloned();

        match loaded {
            Ok(environment) => {
                // The policy must actually be the one the configuration
                // promised.
                if environment.policy().name() != name {
                    let error = CatalogError::EnvironmentMismatch {
                        expected: name.to_string(),
                        actual: environment.policy().name().to_string(),
                    };
                    self.report_failure(name, &error).await;
                    return None;
                }
                Some(environment)
            }
            Err(error) => {
                self.report_failure(name, &error).await;
                None
            }
        }
    }
}
