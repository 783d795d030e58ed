//! `palisade-core`: foundation types for the authorization core.
//!
//! This crate contains **pure security-model** primitives (no persistence
//! concerns): identifiers, the error taxonomy, the securable-resource model,
//! and the shared caching/notification plumbing.

pub mod cache;
pub mod error;
pub mod id;
pub mod notify;
pub mod resource;

pub use cache::LoadingCache;
pub use error::{SecurityError, SecurityResult};
pub use id::{ContainerId, PrincipalId, ResourceId};
pub use notify::{MembershipChange, NotificationBus, SecurityNotification, Subscription};
pub use resource::{Resource, SecurableResource};
