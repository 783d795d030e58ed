//! Immutable security policies and their builder.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use palisade_core::{ContainerId, PrincipalId, ResourceId, SecurableResource, SecurityError, SecurityResult};
use palisade_registry::{PermissionSet, Role};

use crate::assignment::RoleAssignment;

/// Immutable snapshot of the role assignments on one resource.
///
/// Instances are owned by the policy store's cache and never mutated after
/// construction; edits go through [`MutablePolicy`], which produces a new
/// snapshot on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    resource: ResourceId,
    container: Option<ContainerId>,
    /// Sorted by (principal, role).
    assignments: Vec<RoleAssignment>,
    /// Optimistic-concurrency token. `None` for policies that were never
    /// persisted (fresh empty policies, new builders).
    modified: Option<DateTime<Utc>>,
}

impl SecurityPolicy {
    /// A fresh empty policy scoped to `resource`.
    pub fn empty(resource: ResourceId, container: Option<ContainerId>) -> Self {
        Self {
            resource,
            container,
            assignments: Vec::new(),
            modified: None,
        }
    }

    pub(crate) fn from_parts(
        resource: ResourceId,
        container: Option<ContainerId>,
        mut assignments: Vec<RoleAssignment>,
        modified: Option<DateTime<Utc>>,
    ) -> Self {
        assignments.sort();
        assignments.dedup();
        Self {
            resource,
            container,
            assignments,
            modified,
        }
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn container(&self) -> Option<ContainerId> {
        self.container
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    pub fn assignments(&self) -> &[RoleAssignment] {
        &self.assignments
    }

    /// A policy with zero assignments is indistinguishable from "no policy
    /// defined" for inheritance purposes.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Roles assigned directly to `principal`, with no group expansion.
    pub fn assigned_roles(&self, principal: PrincipalId) -> Vec<Role> {
        self.assignments
            .iter()
            .filter(|a| a.principal == principal)
            .map(|a| a.role)
            .collect()
    }

    /// Roles held by any principal in `ids`.
    ///
    /// Single linear merge-join: the assignment list is sorted by principal
    /// and `ids` iterates in ascending order, so this is
    /// O(assignments + ids), not O(assignments × ids).
    pub fn roles_for(&self, ids: &BTreeSet<PrincipalId>) -> BTreeSet<Role> {
        let mut roles = BTreeSet::new();
        let mut assignments = self.assignments.iter().peekable();

        for &id in ids {
            while let Some(a) = assignments.peek() {
                if a.principal < id {
                    assignments.next();
                } else {
                    break;
                }
            }
            while let Some(a) = assignments.peek() {
                if a.principal == id {
                    roles.insert(a.role);
                    assignments.next();
                } else {
                    break;
                }
            }
        }
        roles
    }

    /// Union of the permissions of every role held by `ids`.
    pub fn own_permissions(&self, ids: &BTreeSet<PrincipalId>) -> PermissionSet {
        let mut granted = PermissionSet::new();
        for role in self.roles_for(ids) {
            granted.extend(role.permissions());
        }
        granted
    }
}

/// Builder producing a new immutable [`SecurityPolicy`] on save.
#[derive(Debug, Clone)]
pub struct MutablePolicy {
    resource: ResourceId,
    container: Option<ContainerId>,
    assignments: BTreeSet<RoleAssignment>,
    modified: Option<DateTime<Utc>>,
}

impl MutablePolicy {
    /// Start a new policy for `resource` (no concurrency token; the save
    /// will overwrite whatever exists).
    pub fn new(resource: &dyn SecurableResource) -> Self {
        Self {
            resource: resource.resource_id(),
            container: resource.container_id(),
            assignments: BTreeSet::new(),
            modified: None,
        }
    }

    /// Edit an existing policy, carrying its concurrency token: the save
    /// fails with a conflict if someone else saved in between.
    pub fn from_policy(policy: &SecurityPolicy) -> Self {
        Self {
            resource: policy.resource(),
            container: policy.container(),
            assignments: policy.assignments().iter().copied().collect(),
            modified: policy.modified(),
        }
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn container(&self) -> Option<ContainerId> {
        self.container
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    /// Grant `role` to `principal`. Re-adding an existing grant is a no-op.
    pub fn add_role_assignment(
        &mut self,
        principal: PrincipalId,
        role: Role,
    ) -> SecurityResult<()> {
        if !role.is_assignable() {
            return Err(SecurityError::validation(format!(
                "role '{role}' cannot be assigned through a resource policy"
            )));
        }
        self.assignments
            .insert(RoleAssignment::new(self.resource, principal, role));
        Ok(())
    }

    /// Drop every role assigned to `principal`.
    pub fn clear_assigned_roles(&mut self, principal: PrincipalId) {
        self.assignments.retain(|a| a.principal != principal);
    }

    pub fn assignments(&self) -> impl Iterator<Item = &RoleAssignment> {
        self.assignments.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Sorted assignment list as the save path consumes it.
    pub(crate) fn sorted_assignments(&self) -> Vec<RoleAssignment> {
        self.assignments.iter().copied().collect()
    }
}
