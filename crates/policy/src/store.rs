//! The policy store: caching, inheritance, and guarded saves.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use palisade_audit::{AuditEvent, AuditSink, ChangeKind};
use palisade_core::{
    ContainerId, LoadingCache, NotificationBus, PrincipalId, ResourceId, SecurableResource,
    SecurityError, SecurityNotification, SecurityResult,
};
use palisade_registry::Role;

use crate::assignment::RoleAssignment;
use crate::persistence::{PolicyPersistence, StoredPolicy};
use crate::policy::{MutablePolicy, SecurityPolicy};

/// The user performing a policy mutation.
///
/// `elevated` is whether the user holds site-administration rights; the
/// caller derives it (transitive membership in Administrators) so this crate
/// stays independent of the membership graph.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: PrincipalId,
    pub elevated: bool,
}

impl Actor {
    pub fn new(id: PrincipalId, elevated: bool) -> Self {
        Self { id, elevated }
    }
}

/// Persists and caches one policy per resource, with container-scoped
/// inheritance lookup.
pub struct PolicyStore {
    persistence: Arc<dyn PolicyPersistence>,
    cache: LoadingCache<ResourceId, SecurityPolicy>,
    audit: Arc<dyn AuditSink>,
    bus: Arc<NotificationBus>,
}

impl PolicyStore {
    pub fn new(
        persistence: Arc<dyn PolicyPersistence>,
        audit: Arc<dyn AuditSink>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        Self {
            persistence,
            cache: LoadingCache::new(),
            audit,
            bus,
        }
    }

    /// The effective policy for `resource`, walking inheritance.
    ///
    /// The policy keyed by the exact resource id wins if it has any
    /// assignments; otherwise, while the resource is inheritance-eligible,
    /// the walk moves to the parent resource. If no non-empty policy exists
    /// anywhere in the chain the result is a fresh empty policy scoped to
    /// the original resource, never "null".
    pub fn policy(&self, resource: &dyn SecurableResource) -> Arc<SecurityPolicy> {
        let mut hold: Option<Arc<dyn SecurableResource>> = None;
        loop {
            let current: &dyn SecurableResource = match &hold {
                Some(r) => r.as_ref(),
                None => resource,
            };
            let policy = self.exact_policy(current.resource_id(), current.container_id());
            if !policy.is_empty() {
                return policy;
            }
            if !current.may_inherit_policy() {
                break;
            }
            match current.parent_resource() {
                Some(parent) => hold = Some(parent),
                None => break,
            }
        }
        Arc::new(SecurityPolicy::empty(
            resource.resource_id(),
            resource.container_id(),
        ))
    }

    /// The policy stored for exactly this resource id (no inheritance).
    pub fn exact_policy(
        &self,
        resource: ResourceId,
        container: Option<ContainerId>,
    ) -> Arc<SecurityPolicy> {
        let persistence = self.persistence.clone();
        // Loads cannot fail in-memory; the Result shape exists for real
        // backends, and a failed load is simply not cached.
        let loaded: SecurityResult<Arc<SecurityPolicy>> =
            self.cache.get_or_load(resource, move || {
                Ok(match persistence.load(resource) {
                    Some(row) => SecurityPolicy::from_parts(
                        row.resource,
                        row.container,
                        row.assignments,
                        Some(row.modified),
                    ),
                    None => SecurityPolicy::empty(resource, container),
                })
            });
        match loaded {
            Ok(policy) => policy,
            Err(_) => Arc::new(SecurityPolicy::empty(resource, container)),
        }
    }

    /// Save a policy, replacing all assignments for its resource.
    ///
    /// Returns whether any role assignment effectively changed. The save is
    /// rejected with a conflict when the builder's concurrency token no
    /// longer matches the persisted timestamp; the token travels into
    /// [`PolicyPersistence::replace`], which compare-and-swaps it inside one
    /// critical section, so concurrent savers holding the same token can
    /// never both commit. A save is also rejected with an authorization
    /// error when a privileged role changes on a site-scoped resource
    /// without an elevated actor. The cache entry is invalidated before the
    /// save returns, so a subsequent read on the same thread is fresh; on a
    /// failed replace it is invalidated again in case a reader raced the
    /// pre-commit state.
    pub fn save_policy(&self, policy: &MutablePolicy, actor: &Actor) -> SecurityResult<bool> {
        let resource = policy.resource();
        let current = self.persistence.load(resource);

        let old_assignments = current
            .as_ref()
            .map(|row| row.assignments.clone())
            .unwrap_or_default();
        let new_assignments = normalize(resource, policy.sorted_assignments());
        let (added, removed) = diff_assignments(&old_assignments, &new_assignments);

        let changed_privileged = added
            .iter()
            .chain(removed.iter())
            .any(|a| a.role.is_privileged());
        if changed_privileged && !actor.elevated && policy.container().is_none() {
            return Err(SecurityError::unauthorized(
                "changing a privileged role on a site-wide resource requires site administration rights",
            ));
        }

        let stored = StoredPolicy {
            resource,
            container: policy.container(),
            assignments: new_assignments,
            modified: Utc::now(),
        };
        match self.persistence.replace(&stored, policy.modified()) {
            Ok(()) => {
                self.cache.invalidate(&resource);
            }
            Err(e) => {
                // Rollback guard: a reader may have observed pre-commit
                // invalidation state.
                self.cache.invalidate(&resource);
                return Err(e);
            }
        }

        let changed = !added.is_empty() || !removed.is_empty();
        debug!(
            resource = %resource,
            added = added.len(),
            removed = removed.len(),
            "policy saved"
        );
        self.bus
            .publish(SecurityNotification::PolicyChanged { resource });
        let now = Utc::now();
        for a in &added {
            self.audit.record(AuditEvent {
                acting_user: actor.id,
                resource,
                principal: a.principal,
                role: a.role,
                change: ChangeKind::Added,
                at: now,
            });
        }
        for a in &removed {
            self.audit.record(AuditEvent {
                acting_user: actor.id,
                resource,
                principal: a.principal,
                role: a.role,
                change: ChangeKind::Removed,
                at: now,
            });
        }
        Ok(changed)
    }

    /// Delete the policy for `resource`; it reverts to inherited behavior.
    pub fn delete_policy(&self, resource: ResourceId, actor: &Actor) -> SecurityResult<()> {
        let removed = self.persistence.delete(resource);
        self.cache.invalidate(&resource);
        self.bus
            .publish(SecurityNotification::PolicyDeleted { resource });

        if let Some(row) = removed {
            let now = Utc::now();
            for a in row.assignments {
                self.audit.record(AuditEvent {
                    acting_user: actor.id,
                    resource,
                    principal: a.principal,
                    role: a.role,
                    change: ChangeKind::Removed,
                    at: now,
                });
            }
        }
        Ok(())
    }

    /// Remove every assignment referencing `principal` across all policies
    /// (group-deletion path).
    pub fn strip_principal(&self, principal: PrincipalId, actor: &Actor) -> SecurityResult<()> {
        for resource in self.persistence.resources_with_principal(principal) {
            let removed = self.persistence.strip_principal(resource, principal);
            self.cache.invalidate(&resource);
            self.bus
                .publish(SecurityNotification::PolicyChanged { resource });
            let now = Utc::now();
            for a in removed {
                self.audit.record(AuditEvent {
                    acting_user: actor.id,
                    resource,
                    principal: a.principal,
                    role: a.role,
                    change: ChangeKind::Removed,
                    at: now,
                });
            }
        }
        Ok(())
    }
}

/// Strip redundant NoPermissions assignments; if stripping emptied a
/// previously non-empty set, re-add exactly one NoPermissions assignment to
/// Guests. That marker distinguishes "explicitly no access" from "no policy
/// defined, inherit from parent"; a policy saved with zero assignments
/// stays empty and therefore inherits.
fn normalize(resource: ResourceId, assignments: Vec<RoleAssignment>) -> Vec<RoleAssignment> {
    if assignments.is_empty() {
        return assignments;
    }
    let stripped: Vec<RoleAssignment> = assignments
        .iter()
        .copied()
        .filter(|a| a.role != Role::NoPermissions)
        .collect();
    if stripped.is_empty() {
        vec![RoleAssignment::new(
            resource,
            PrincipalId::GUESTS,
            Role::NoPermissions,
        )]
    } else {
        stripped
    }
}

/// Minimal added/removed sets between two assignment lists, both sorted by
/// (principal, role), in one linear pass.
fn diff_assignments(
    old: &[RoleAssignment],
    new: &[RoleAssignment],
) -> (Vec<RoleAssignment>, Vec<RoleAssignment>) {
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut i = 0;
    let mut j = 0;

    while i < old.len() && j < new.len() {
        match old[i].key().cmp(&new[j].key()) {
            core::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
            core::cmp::Ordering::Less => {
                removed.push(old[i]);
                i += 1;
            }
            core::cmp::Ordering::Greater => {
                added.push(new[j]);
                j += 1;
            }
        }
    }
    removed.extend_from_slice(&old[i..]);
    added.extend_from_slice(&new[j..]);
    (added, removed)
}
