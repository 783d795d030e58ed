//! `palisade-principals`: the principal model and store boundary.
//!
//! Users and groups are both principals: groups can be members of other
//! groups and can hold role assignments, symmetrically with users. The
//! store trait is the narrow interface behind which directory persistence
//! (SQL, LDAP sync, …) lives.

pub mod group;
pub mod principal;
pub mod store;
pub mod user;

pub use group::Group;
pub use principal::{Principal, PrincipalType};
pub use store::{InMemoryPrincipalStore, PrincipalStore};
pub use user::{ImpersonationContext, PermissionFilter, User};
