//! Principal and identity model for stint.
//!
//! Everything that policy evaluation needs to know about "who is asking"
//! lives here: typed identifiers, the [`Principal`] variants a subject can
//! carry, the [`Subject`] itself, and the [`GroupMapping`] between stint
//! group ids and the directory groups that back them.

pub mod ids;
pub mod mapping;
pub mod principal;
pub mod subject;

pub use ids::{ClassId, GroupId, IdError, JitGroupId, UserId};
pub use mapping::GroupMapping;
pub use principal::{Principal, PrincipalId};
pub use subject::Subject;
