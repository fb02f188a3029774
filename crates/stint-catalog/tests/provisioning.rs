//! Provisioner convergence and reconciliation scenarios.

mod common;

use common::*;
use chrono::{Duration, Utc};
use std::sync::Arc;
use stint_auth::{GroupMapping, JitGroupId};
use stint_directory::{DirectoryClient, GroupType, ResourceId};
use stint_policy::{
    Constraint, ConstraintClass, ConstraintMap, ExpiryConstraint, IamRoleBinding, PolicyPermission,
    Privilege,
};

fn group_id() -> JitGroupId {
    JitGroupId::new("prod", "web", "admins")
}

fn joinable_acl() -> Option<stint_policy::AccessControlList> {
    acl(vec![allow(
        "user@x.com",
        PolicyPermission::VIEW
            | PolicyPermission::JOIN
            | PolicyPermission::APPROVE_SELF
            | PolicyPermission::RECONCILE,
    )])
}

fn fixed_expiry() -> ConstraintMap {
    ConstraintMap::from([(
        ConstraintClass::Join,
        vec![Arc::new(Constraint::Expiry(
            ExpiryConstraint::fixed(Duration::seconds(3600)).unwrap(),
        ))],
    )])
}

fn viewer_binding() -> Privilege {
    Privilege::IamRoleBinding(
        IamRoleBinding::new(ResourceId::new("project", "acme-prod"), "roles/viewer")
            .with_description("web admin access"),
    )
}

#[tokio::test]
async fn provisioning_creates_group_membership_and_bindings() {
    let policy = environment_policy(group_policy(
        joinable_acl(),
        fixed_expiry(),
        vec![viewer_binding()],
    ));
    let fixture = fixture(policy);
    let catalog = fixture.catalog_for("user@x.com").await;

    catalog
        .group(&group_id())
        .await
        .unwrap()
        .join()
        .execute()
        .await
        .unwrap();

    // The backing group exists, with the breadcrumb display name and a
    // checksum-tagged description.
    let mapping = GroupMapping::new(DOMAIN);
    let directory_group = mapping.group_from_jit_group(&group_id());
    let group = fixture.directory.get_group(&directory_group).await.unwrap();
    assert_eq!(group.display_name, "JIT Group prod \u{203a} web \u{203a} admins");
    assert!(group.description.contains('#'));

    // The binding references the group principal.
    let policy = fixture
        .resource_manager
        .policy(&ResourceId::new("project", "acme-prod"));
    assert_eq!(policy.bindings.len(), 1);
    assert_eq!(policy.bindings[0].role, "roles/viewer");
    assert_eq!(
        policy.bindings[0].members,
        vec![format!("group:{}", directory_group)]
    );
}

#[tokio::test]
async fn unchanged_bindings_short_circuit() {
    let policy = environment_policy(group_policy(
        joinable_acl(),
        fixed_expiry(),
        vec![viewer_binding()],
    ));
    let fixture = fixture(policy);
    let catalog = fixture.catalog_for("user@x.com").await;
    let view = catalog.group(&group_id()).await.unwrap();

    view.join().execute().await.unwrap();
    assert_eq!(fixture.resource_manager.write_count(), 1);
    assert_eq!(fixture.directory.patch_count(), 1);

    // A second join with an identical binding set: the checksum
    // matches, so no IAM write and no description rewrite happen.
    view.join().execute().await.unwrap();
    assert_eq!(fixture.resource_manager.write_count(), 1);
    assert_eq!(fixture.directory.patch_count(), 1);
}

#[tokio::test]
async fn changed_bindings_are_reprovisioned() {
    let fixture = {
        let policy = environment_policy(group_policy(
            joinable_acl(),
            fixed_expiry(),
            vec![viewer_binding()],
        ));
        fixture(policy)
    };
    let catalog = fixture.catalog_for("user@x.com").await;
    catalog
        .group(&group_id())
        .await
        .unwrap()
        .join()
        .execute()
        .await
        .unwrap();
    assert_eq!(fixture.resource_manager.write_count(), 1);

    // The same environment, but the policy now grants a different
    // role. Reuse the directory state through a fresh fixture wired to
    // the same backends.
    let changed = environment_policy(group_policy(
        joinable_acl(),
        fixed_expiry(),
        vec![Privilege::IamRoleBinding(IamRoleBinding::new(
            ResourceId::new("project", "acme-prod"),
            "roles/editor",
        ))],
    ));
    let provisioner = stint_catalog::Provisioner::new(
        GroupMapping::new(DOMAIN),
        Arc::clone(&fixture.directory) as _,
        Arc::clone(&fixture.resource_manager) as _,
        Arc::new(stint_audit::TracingAuditLog),
    );
    let group = changed.system("web").unwrap().group("admins").unwrap();
    provisioner.reconcile(&group).await.unwrap();

    // Exactly one write for the one affected resource, plus a tag
    // rewrite.
    assert_eq!(fixture.resource_manager.write_count(), 2);
    assert_eq!(fixture.directory.patch_count(), 2);

    let policy = fixture
        .resource_manager
        .policy(&ResourceId::new("project", "acme-prod"));
    assert_eq!(policy.bindings.len(), 1);
    assert_eq!(policy.bindings[0].role, "roles/editor");

    // Converged: another reconcile is a no-op.
    provisioner.reconcile(&group).await.unwrap();
    assert_eq!(fixture.resource_manager.write_count(), 2);
}

#[tokio::test]
async fn bindings_on_multiple_resources_are_grouped() {
    let policy = environment_policy(group_policy(
        joinable_acl(),
        fixed_expiry(),
        vec![
            viewer_binding(),
            Privilege::IamRoleBinding(IamRoleBinding::new(
                ResourceId::new("project", "acme-prod"),
                "roles/logging.viewer",
            )),
            Privilege::IamRoleBinding(IamRoleBinding::new(
                ResourceId::new("project", "acme-analytics"),
                "roles/viewer",
            )),
        ],
    ));
    let fixture = fixture(policy);
    let catalog = fixture.catalog_for("user@x.com").await;
    catalog
        .group(&group_id())
        .await
        .unwrap()
        .join()
        .execute()
        .await
        .unwrap();

    // One write per resource.
    assert_eq!(fixture.resource_manager.write_count(), 2);
    assert_eq!(
        fixture
            .resource_manager
            .policy(&ResourceId::new("project", "acme-prod"))
            .bindings
            .len(),
        2
    );
    assert_eq!(
        fixture
            .resource_manager
            .policy(&ResourceId::new("project", "acme-analytics"))
            .bindings
            .len(),
        1
    );
}

#[tokio::test]
async fn interrupted_provisioning_retries_on_next_run() {
    let policy = environment_policy(group_policy(
        joinable_acl(),
        fixed_expiry(),
        vec![viewer_binding()],
    ));
    let fixture = fixture(policy);
    let catalog = fixture.catalog_for("user@x.com").await;
    let view = catalog.group(&group_id()).await.unwrap();

    // Exhaust the retry budget so the IAM write fails before the
    // description tag is updated.
    fixture.resource_manager.inject_conflicts(4);
    let err = view.join().execute().await.unwrap_err();
    assert!(matches!(
        err,
        stint_catalog::CatalogError::Directory(stint_directory::DirectoryError::Conflict)
    ));
    assert_eq!(fixture.directory.patch_count(), 0);

    // The next run detects the stale tag and converges.
    view.join().execute().await.unwrap();
    assert_eq!(fixture.resource_manager.write_count(), 1);
    assert_eq!(fixture.directory.patch_count(), 1);
}

#[tokio::test]
async fn reconcile_reports_compliance_and_orphans() {
    let policy = environment_policy(group_policy(
        joinable_acl(),
        fixed_expiry(),
        vec![viewer_binding()],
    ));
    let fixture = fixture(policy);

    // Provision the declared group, then plant an orphan: a directory
    // group following the naming scheme with no policy behind it.
    let catalog = fixture.catalog_for("user@x.com").await;
    catalog
        .group(&group_id())
        .await
        .unwrap()
        .join()
        .execute()
        .await
        .unwrap();
    let orphan_id = stint_auth::GroupId::new(format!("jit.prod.web.retired@{}", DOMAIN)).unwrap();
    fixture
        .directory
        .create_group(&orphan_id, GroupType::Security, "orphan", "")
        .await
        .unwrap();

    let environment = catalog.environment("prod").await.unwrap();
    assert!(environment.can_reconcile());
    let compliance = environment.reconcile().await.unwrap().unwrap();

    assert_eq!(compliance.len(), 2);
    let admins = compliance
        .iter()
        .find(|c| c.group() == &group_id())
        .unwrap();
    assert!(admins.is_compliant());

    let retired = compliance
        .iter()
        .find(|c| c.group() == &JitGroupId::new("prod", "web", "retired"))
        .unwrap();
    assert!(retired.is_orphaned());
    assert!(retired.error().is_none());
}

#[tokio::test]
async fn reconcile_requires_permission() {
    let policy = environment_policy(group_policy(
        acl(vec![allow("user@x.com", PolicyPermission::VIEW)]),
        ConstraintMap::new(),
        vec![],
    ));
    let fixture = fixture(policy);
    let catalog = fixture.catalog_for("user@x.com").await;

    let environment = catalog.environment("prod").await.unwrap();
    assert!(!environment.can_reconcile());
    assert!(environment.reconcile().await.unwrap().is_none());
}

#[tokio::test]
async fn export_requires_permission() {
    let policy = environment_policy(group_policy(
        acl(vec![allow("user@x.com", PolicyPermission::VIEW)]),
        ConstraintMap::new(),
        vec![],
    ));
    let fixture = fixture(policy);

    let viewer = fixture.catalog_for("user@x.com").await;
    let environment = viewer.environment("prod").await.unwrap();
    assert!(!environment.can_export());
    assert!(environment.export().is_none());
}

#[tokio::test]
async fn membership_expiry_is_renewed_on_rejoin() {
    let policy = environment_policy(group_policy(
        joinable_acl(),
        fixed_expiry(),
        vec![],
    ));
    let fixture = fixture(policy);
    let catalog = fixture.catalog_for("user@x.com").await;
    let view = catalog.group(&group_id()).await.unwrap();

    let first = view.join().execute().await.unwrap();
    let second = view.join().execute().await.unwrap();
    assert!(second.expiry().unwrap() >= first.expiry().unwrap());
    assert!(second.expiry().unwrap() <= Utc::now() + Duration::seconds(3600));

    let mapping = GroupMapping::new(DOMAIN);
    let stored = fixture
        .directory
        .membership_for(&mapping.group_from_jit_group(&group_id()), &user("user@x.com"))
        .unwrap();
    assert_eq!(stored.earliest_expiry(), second.expiry());
}
