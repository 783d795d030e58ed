//! `palisade-registry`: the static role/permission catalog.
//!
//! Roles are named bundles of permissions; permissions are atomic capability
//! markers. Both are closed sets of tagged variants resolved through a
//! registry table rather than open-ended runtime registration.

pub mod permission;
pub mod registry;
pub mod role;

pub use permission::{Permission, PermissionSet};
pub use registry::Registry;
pub use role::Role;
