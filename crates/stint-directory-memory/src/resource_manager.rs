//! In-memory resource-manager backend with optimistic concurrency.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use stint_directory::{
    DirectoryError, IamPolicy, IamPolicyMutation, ResourceId, ResourceManagerClient,
};

/// Attempts before a contended update surfaces as a conflict.
const MAX_ATTEMPTS: usize = 4;

#[derive(Clone, Default)]
struct Versioned {
    version: u64,
    policy: IamPolicy,
}

/// In-memory [`ResourceManagerClient`].
///
/// Updates follow the read-modify-write protocol: the mutation runs
/// against a snapshot and the write commits only if nobody else wrote
/// in between. Tests can inject lost races via
/// [`Self::inject_conflicts`].
#[derive(Default)]
pub struct MemoryResourceManager {
    policies: DashMap<ResourceId, Versioned>,
    injected_conflicts: AtomicUsize,
    write_count: AtomicUsize,
}

impl MemoryResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commit attempts lose their race.
    pub fn inject_conflicts(&self, n: usize) {
        self.injected_conflicts.store(n, Ordering::Relaxed);
    }

    /// Number of committed policy writes.
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Current policy of a resource (empty if never written).
    pub fn policy(&self, resource: &ResourceId) -> IamPolicy {
        self.policies
            .get(resource)
            .map(|v| v.policy.clone())
            .unwrap_or_default()
    }

    fn snapshot(&self, resource: &ResourceId) -> Versioned {
        self.policies
            .get(resource)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    fn lost_injected_race(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl ResourceManagerClient for MemoryResourceManager {
    async fn modify_iam_policy(
        &self,
        resource: &ResourceId,
        mutation: IamPolicyMutation<'_>,
        _rationale: &str,
    ) -> Result<(), DirectoryError> {
        for _ in 0..MAX_ATTEMPTS {
            let read = self.snapshot(resource);
            let mut updated = read.policy.clone();
            mutation(&mut updated);

            if self.lost_injected_race() {
                continue;
            }

            // Commit only if the version we read is still current.
            let mut entry = self.policies.entry(resource.clone()).or_default();
            if entry.version != read.version {
                continue;
            }
            entry.version += 1;
            updated.etag = entry.version.to_string();
            entry.policy = updated;
            self.write_count.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        Err(DirectoryError::Conflict)
    }
}
