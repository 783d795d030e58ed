//! `palisade-graph`: the group-membership graph.
//!
//! Maintains direct group→member edges, computes transitive closures in both
//! directions, and prevents cycles at insertion time. Closures are cached
//! behind a single-flight cache that is cleared on every edge mutation.

pub mod edges;
pub mod graph;

pub use edges::{InMemoryMembershipStore, MembershipStore};
pub use graph::GroupMembershipGraph;
