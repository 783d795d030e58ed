//! Role assignments.

use serde::{Deserialize, Serialize};

use palisade_core::{PrincipalId, ResourceId};
use palisade_registry::Role;

/// One (resource, principal, role) grant.
///
/// A principal may hold multiple distinct roles on the same resource, one
/// assignment per role. Assignments sort by (principal, role) so a policy's
/// assignment list can be merge-joined against a sorted principal id set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub resource: ResourceId,
    pub principal: PrincipalId,
    pub role: Role,
}

impl RoleAssignment {
    pub fn new(resource: ResourceId, principal: PrincipalId, role: Role) -> Self {
        Self {
            resource,
            principal,
            role,
        }
    }

    /// The merge-join key.
    pub fn key(&self) -> (PrincipalId, Role) {
        (self.principal, self.role)
    }
}

impl Ord for RoleAssignment {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (self.principal, self.role, self.resource).cmp(&(
            other.principal,
            other.role,
            other.resource,
        ))
    }
}

impl PartialOrd for RoleAssignment {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
