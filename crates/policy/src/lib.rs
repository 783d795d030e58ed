//! `palisade-policy`: security policies and their store.
//!
//! A security policy is an immutable snapshot of the role assignments on one
//! securable resource. The store persists and caches policies, walks
//! container inheritance, and guards saves with optimistic concurrency and
//! the privileged-role check.

pub mod assignment;
pub mod persistence;
pub mod policy;
pub mod store;

pub use assignment::RoleAssignment;
pub use persistence::{InMemoryPolicyPersistence, PolicyPersistence, StoredPolicy};
pub use policy::{MutablePolicy, SecurityPolicy};
pub use store::{Actor, PolicyStore};
