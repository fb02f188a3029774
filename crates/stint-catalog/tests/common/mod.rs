//! Shared fixtures for the catalog integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use stint_audit::TracingAuditLog;
use stint_auth::{GroupMapping, PrincipalId, Subject, UserId};
use stint_catalog::{
    CachedEnvironmentSource, Catalog, CatalogError, Environment, EnvironmentLoader, Provisioner,
    SubjectResolver,
};
use stint_directory::DirectoryError;
use stint_directory_memory::{MemoryDirectory, MemoryResourceManager};
use stint_policy::{
    AccessControlEntry, AccessControlList, ConstraintMap, EnvironmentPolicy, JitGroupPolicy,
    Metadata, PolicyDocument, PolicyPermission, Privilege, SystemPolicy,
};

pub const DOMAIN: &str = "example.com";

pub fn user(email: &str) -> UserId {
    UserId::new(email).unwrap()
}

pub fn allow(email: &str, mask: PolicyPermission) -> AccessControlEntry {
    AccessControlEntry::allow(PrincipalId::User(user(email)), mask)
}

pub fn acl(entries: Vec<AccessControlEntry>) -> Option<AccessControlList> {
    Some(AccessControlList::new(entries))
}

pub fn metadata() -> Metadata {
    Metadata {
        source: "memory".to_string(),
        last_modified: Utc::now(),
    }
}

/// Assemble a `prod` environment with a `web` system and one group.
pub fn environment_policy(group: JitGroupPolicy) -> Arc<EnvironmentPolicy> {
    let env = Arc::new(
        EnvironmentPolicy::new("prod", "production", None, ConstraintMap::new(), metadata())
            .unwrap(),
    );
    let sys =
        Arc::new(SystemPolicy::new("web", "web tier", None, ConstraintMap::new()).unwrap());
    env.add_system(Arc::clone(&sys)).unwrap();
    sys.add_group(Arc::new(group)).unwrap();
    env
}

pub fn group_policy(
    acl: Option<AccessControlList>,
    constraints: ConstraintMap,
    privileges: Vec<Privilege>,
) -> JitGroupPolicy {
    JitGroupPolicy::new("admins", "web admins", acl, constraints, privileges).unwrap()
}

pub struct Fixture {
    pub directory: Arc<MemoryDirectory>,
    pub resource_manager: Arc<MemoryResourceManager>,
    pub environment: Arc<Environment>,
    pub source: Arc<CachedEnvironmentSource>,
}

struct FixtureLoader {
    environments: HashMap<String, Arc<Environment>>,
}

#[async_trait::async_trait]
impl EnvironmentLoader for FixtureLoader {
    async fn load(&self, name: &str) -> Result<Arc<Environment>, CatalogError> {
        self.environments
            .get(name)
            .cloned()
            .ok_or(CatalogError::Directory(DirectoryError::NotFound))
    }
}

pub fn fixture(policy: Arc<EnvironmentPolicy>) -> Fixture {
    let directory = Arc::new(MemoryDirectory::new());
    let resource_manager = Arc::new(MemoryResourceManager::new());
    let provisioner = Arc::new(Provisioner::new(
        GroupMapping::new(DOMAIN),
        Arc::clone(&directory) as _,
        Arc::clone(&resource_manager) as _,
        Arc::new(TracingAuditLog),
    ));
    let name = stint_policy::Policy::name(policy.as_ref()).to_string();
    let environment = Arc::new(Environment::new(
        PolicyDocument::new(policy, "environment: prod\n"),
        provisioner,
    ));
    let source = Arc::new(CachedEnvironmentSource::new(
        [name.clone()],
        Arc::new(FixtureLoader {
            environments: HashMap::from([(name, Arc::clone(&environment))]),
        }),
        Duration::from_secs(300),
        Arc::new(TracingAuditLog),
    ));
    Fixture {
        directory,
        resource_manager,
        environment,
        source,
    }
}

impl Fixture {
    /// Build a catalog for a user, resolving the subject through the
    /// directory so provisioned memberships are visible.
    pub async fn catalog_for(&self, email: &str) -> Catalog {
        let resolver = SubjectResolver::new(
            Arc::clone(&self.directory) as _,
            GroupMapping::new(DOMAIN),
            Arc::new(TracingAuditLog),
        );
        let subject = resolver.resolve(&user(email)).await.unwrap();
        Catalog::new(Arc::new(subject), Arc::clone(&self.source) as _)
    }

    /// Build a catalog without touching the directory.
    pub fn catalog_for_bare(&self, email: &str) -> Catalog {
        Catalog::new(
            Arc::new(Subject::bare(user(email))),
            Arc::clone(&self.source) as _,
        )
    }
}
