//! Catalog, join pipeline, and provisioning engine for stint.
//!
//! The [`Catalog`] exposes subject-scoped views over the policy tree.
//! Targeting a group yields a [`JoinOperation`] that combines the ACL
//! decision, constraint checks, and user inputs; on success the
//! [`Provisioner`] converges the backing directory group and IAM role
//! bindings with the policy. Joins that need somebody else's approval
//! travel between users as signed [`Deferral`] tokens.

pub mod catalog;
pub mod checksum;
pub mod deferral;
pub mod environment;
pub mod error;
pub mod group;
pub mod provision;
pub mod resolver;
pub mod source;

pub use catalog::Catalog;
pub use checksum::BindingChecksum;
pub use deferral::{Deferral, Deferrer};
pub use environment::{Environment, EnvironmentView, GroupCompliance, SystemView};
pub use error::{CatalogError, PUBLIC_DENIAL_MESSAGE};
pub use group::{JitGroupView, JoinOperation, JoinStatus};
pub use provision::Provisioner;
pub use resolver::{LazySubject, SubjectResolver};
pub use source::{
    CachedEnvironmentSource, DocumentEnvironmentLoader, EnvironmentLoader, EnvironmentSource,
    PolicyTextSource, ProvisionerFactory,
};
