//! `palisade-security`: permission resolution and the service facade.
//!
//! Wires the principal directory, the membership graph and the policy store
//! into one surface: group lifecycle, policy mutation, and the
//! "may this user do that" checks the rest of the platform calls.

pub mod resolver;
pub mod service;

pub use resolver::PermissionResolver;
pub use service::SecurityService;
