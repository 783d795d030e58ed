//! Membership edge storage.
//!
//! Edges are kept as adjacency lists keyed by integer principal id, indexed
//! in both directions so membership and closure walks never scan the whole
//! edge set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use palisade_core::{PrincipalId, SecurityError, SecurityResult};

/// Storage boundary for direct membership edges (groupId, memberId).
pub trait MembershipStore: Send + Sync {
    /// Insert a direct edge. Adding an existing member is an error, not a
    /// no-op.
    fn insert(&self, group: PrincipalId, member: PrincipalId) -> SecurityResult<()>;

    /// Remove a direct edge. Returns whether the edge existed.
    fn remove(&self, group: PrincipalId, member: PrincipalId) -> bool;

    /// Remove every edge touching `principal`, in both directions (group
    /// deletion path). Returns the number of edges removed.
    fn remove_all(&self, principal: PrincipalId) -> usize;

    fn contains(&self, group: PrincipalId, member: PrincipalId) -> bool;

    /// Direct members of `group` (one hop, member direction).
    fn direct_members(&self, group: PrincipalId) -> Vec<PrincipalId>;

    /// Groups `member` is a direct member of (one hop, parent direction).
    fn direct_groups(&self, member: PrincipalId) -> Vec<PrincipalId>;
}

#[derive(Default)]
struct EdgeState {
    /// group -> members
    members: BTreeMap<PrincipalId, BTreeSet<PrincipalId>>,
    /// member -> groups
    groups: BTreeMap<PrincipalId, BTreeSet<PrincipalId>>,
}

/// In-memory adjacency store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Default)]
pub struct InMemoryMembershipStore {
    inner: RwLock<EdgeState>,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, EdgeState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EdgeState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MembershipStore for InMemoryMembershipStore {
    fn insert(&self, group: PrincipalId, member: PrincipalId) -> SecurityResult<()> {
        let mut state = self.write();
        let inserted = state.members.entry(group).or_default().insert(member);
        if !inserted {
            return Err(SecurityError::validation(format!(
                "principal {member} is already a member of group {group}"
            )));
        }
        state.groups.entry(member).or_default().insert(group);
        Ok(())
    }

    fn remove(&self, group: PrincipalId, member: PrincipalId) -> bool {
        let mut state = self.write();
        let removed = state
            .members
            .get_mut(&group)
            .map(|m| m.remove(&member))
            .unwrap_or(false);
        if removed {
            if let Some(g) = state.groups.get_mut(&member) {
                g.remove(&group);
            }
        }
        removed
    }

    fn remove_all(&self, principal: PrincipalId) -> usize {
        let mut state = self.write();
        let mut removed = 0;

        if let Some(members) = state.members.remove(&principal) {
            removed += members.len();
            for m in members {
                if let Some(g) = state.groups.get_mut(&m) {
                    g.remove(&principal);
                }
            }
        }
        if let Some(groups) = state.groups.remove(&principal) {
            removed += groups.len();
            for g in groups {
                if let Some(m) = state.members.get_mut(&g) {
                    m.remove(&principal);
                }
            }
        }
        removed
    }

    fn contains(&self, group: PrincipalId, member: PrincipalId) -> bool {
        self.read()
            .members
            .get(&group)
            .map(|m| m.contains(&member))
            .unwrap_or(false)
    }

    fn direct_members(&self, group: PrincipalId) -> Vec<PrincipalId> {
        self.read()
            .members
            .get(&group)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    fn direct_groups(&self, member: PrincipalId) -> Vec<PrincipalId> {
        self.read()
            .groups
            .get(&member)
            .map(|g| g.iter().copied().collect())
            .unwrap_or_default()
    }
}
