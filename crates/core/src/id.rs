//! Strongly-typed identifiers used across the authorization core.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SecurityError;

/// Identifier of a principal (user or group).
///
/// Principals are keyed by a stable integer id so that role assignments can
/// be merge-joined against sorted id sets in a single linear pass. System
/// groups occupy fixed negative ids; ordinary principals are assigned
/// positive ids by the principal store. Id `0` is the anonymous guest user.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(i32);

impl PrincipalId {
    /// Site administrators system group.
    pub const ADMINISTRATORS: Self = Self(-1);
    /// All registered users (synthetic membership; not materialized as edges).
    pub const USERS: Self = Self(-2);
    /// All users including anonymous guests (implicit membership).
    pub const GUESTS: Self = Self(-3);
    /// Platform developers system group.
    pub const DEVELOPERS: Self = Self(-4);
    /// The anonymous guest user.
    pub const GUEST_USER: Self = Self(0);

    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_i32(&self) -> i32 {
        self.0
    }

    /// System groups are the fixed negative-id groups. They cannot be
    /// deleted or renamed, cannot be members of any group, and never accept
    /// group members.
    pub const fn is_system_group(&self) -> bool {
        self.0 < 0
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i32> for PrincipalId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<PrincipalId> for i32 {
    fn from(value: PrincipalId) -> Self {
        value.0
    }
}

/// Identifier of a container (project/folder scoping boundary).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(Uuid);

/// Identifier of a securable resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in
            /// tests for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = SecurityError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| SecurityError::validation(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(ContainerId, "ContainerId");
impl_uuid_newtype!(ResourceId, "ResourceId");

impl ContainerId {
    /// The resource id of the container's own securable resource (a
    /// container is itself securable, sharing the same underlying uuid).
    pub fn as_resource_id(&self) -> ResourceId {
        ResourceId::from_uuid(self.0)
    }
}
