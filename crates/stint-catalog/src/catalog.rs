//! Subject-scoped entry point for discovering and joining groups.

use crate::environment::{EnvironmentView, SystemView};
use crate::group::JitGroupView;
use crate::source::EnvironmentSource;
use std::sync::Arc;
use stint_auth::{JitGroupId, Subject};
use stint_policy::{Policy, PolicyHeader, PolicyPermission};

/// Catalog of the environments, systems, and groups one subject can
/// see. Lookups that miss and lookups the subject may not see are both
/// absent, so callers can't distinguish the two.
pub struct Catalog {
    subject: Arc<Subject>,
    source: Arc<dyn EnvironmentSource>,
}

impl Catalog {
    pub fn new(subject: Arc<Subject>, source: Arc<dyn EnvironmentSource>) -> Self {
        Self { subject, source }
    }

    pub fn subject(&self) -> &Arc<Subject> {
        &self.subject
    }

    /// Headers of all environments, sorted by name. Requires no
    /// permission: checking one would force loading every policy, so
    /// only minimal data is returned.
    pub fn environments(&self) -> Vec<PolicyHeader> {
        let mut headers = self.source.environments();
        headers.sort_by(|a, b| a.name.cmp(&b.name));
        headers
    }

    /// An environment by name. Requires VIEW access.
    pub async fn environment(&self, name: &str) -> Option<EnvironmentView> {
        self.source
            .lookup(name)
            .await
            .filter(|env| {
                env.policy()
                    .is_allowed_by_acl(&self.subject, PolicyPermission::VIEW)
            })
            .map(|env| EnvironmentView::new(env, Arc::clone(&self.subject)))
    }

    /// A system by environment and name. Requires VIEW access on both.
    pub async fn system(&self, environment: &str, name: &str) -> Option<SystemView> {
        self.environment(environment).await?.system(name)
    }

    /// A group by id. Requires VIEW access along the whole path.
    pub async fn group(&self, id: &JitGroupId) -> Option<JitGroupView> {
        self.environment(id.environment())
            .await?
            .system(id.system())?
            .group(id.name())
    }
}
