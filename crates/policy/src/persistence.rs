//! Policy persistence boundary.
//!
//! One stored row per resource: the assignment set plus the modification
//! timestamp. Replacement is atomic relative to readers: a concurrent load
//! observes either the fully-old or fully-new assignment set, never a
//! partial one.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use palisade_core::SecurityError;
use serde::{Deserialize, Serialize};

use palisade_core::{ContainerId, PrincipalId, ResourceId, SecurityResult};

use crate::assignment::RoleAssignment;

/// Persisted form of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPolicy {
    pub resource: ResourceId,
    pub container: Option<ContainerId>,
    /// Sorted by (principal, role).
    pub assignments: Vec<RoleAssignment>,
    pub modified: DateTime<Utc>,
}

/// Storage boundary for policies and their assignments.
pub trait PolicyPersistence: Send + Sync {
    fn load(&self, resource: ResourceId) -> Option<StoredPolicy>;

    /// Replace the stored policy for `policy.resource` in one atomic step
    /// (delete-all-then-insert-all under a single transaction).
    ///
    /// When `expected` is `Some`, the replacement is a compare-and-swap on
    /// the row's modified timestamp: the swap happens only if the current
    /// row exists and carries exactly that timestamp, otherwise the call
    /// fails with a conflict and the row is untouched. The token check and
    /// the write share one critical section, so two concurrent savers
    /// holding the same token can never both commit.
    fn replace(
        &self,
        policy: &StoredPolicy,
        expected: Option<DateTime<Utc>>,
    ) -> SecurityResult<()>;

    /// Remove the policy row and its assignments. Returns what was removed.
    fn delete(&self, resource: ResourceId) -> Option<StoredPolicy>;

    /// Resources whose policy references `principal` (group-deletion path).
    fn resources_with_principal(&self, principal: PrincipalId) -> Vec<ResourceId>;

    /// Remove every assignment of `principal` from the policy of `resource`.
    /// Returns the removed assignments.
    fn strip_principal(
        &self,
        resource: ResourceId,
        principal: PrincipalId,
    ) -> Vec<RoleAssignment>;
}

/// In-memory policy persistence.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Default)]
pub struct InMemoryPolicyPersistence {
    rows: RwLock<BTreeMap<ResourceId, StoredPolicy>>,
}

impl InMemoryPolicyPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ResourceId, StoredPolicy>> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ResourceId, StoredPolicy>> {
        self.rows.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PolicyPersistence for InMemoryPolicyPersistence {
    fn load(&self, resource: ResourceId) -> Option<StoredPolicy> {
        self.read().get(&resource).cloned()
    }

    fn replace(
        &self,
        policy: &StoredPolicy,
        expected: Option<DateTime<Utc>>,
    ) -> SecurityResult<()> {
        let mut rows = self.write();
        if let Some(token) = expected {
            match rows.get(&policy.resource) {
                Some(row) if row.modified == token => {}
                _ => {
                    return Err(SecurityError::conflict(
                        "the security policy was modified by someone else; reload and retry",
                    ));
                }
            }
        }
        rows.insert(policy.resource, policy.clone());
        Ok(())
    }

    fn delete(&self, resource: ResourceId) -> Option<StoredPolicy> {
        self.write().remove(&resource)
    }

    fn resources_with_principal(&self, principal: PrincipalId) -> Vec<ResourceId> {
        self.read()
            .values()
            .filter(|p| p.assignments.iter().any(|a| a.principal == principal))
            .map(|p| p.resource)
            .collect()
    }

    fn strip_principal(
        &self,
        resource: ResourceId,
        principal: PrincipalId,
    ) -> Vec<RoleAssignment> {
        let mut rows = self.write();
        let Some(row) = rows.get_mut(&resource) else {
            return Vec::new();
        };
        let (removed, kept): (Vec<_>, Vec<_>) = row
            .assignments
            .iter()
            .copied()
            .partition(|a| a.principal == principal);
        if !removed.is_empty() {
            row.assignments = kept;
            row.modified = Utc::now();
        }
        removed
    }
}
