//! Principal store boundary.
//!
//! The trait is the narrow interface to directory persistence. The in-memory
//! implementation backs tests and development; it seeds the system groups
//! and the anonymous guest user the way a fresh deployment would.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use palisade_core::{ContainerId, PrincipalId, SecurityError, SecurityResult};

use crate::group::Group;
use crate::principal::{Principal, PrincipalType};

/// Resolves ids and names to principals.
///
/// Returned values are defensive copies; lazily computed group closures are
/// recomputed per use rather than mutated in place.
pub trait PrincipalStore: Send + Sync {
    fn find_by_id(&self, id: PrincipalId) -> Option<Principal>;

    /// Name lookup scoped to a container (`None` = site scope).
    /// Names are matched case-insensitively.
    fn find_by_name(&self, name: &str, scope: Option<ContainerId>) -> Option<Principal>;

    fn is_active(&self, id: PrincipalId) -> bool;

    /// All active user principals, excluding the anonymous guest. This is
    /// the materialization of the synthetic Users group.
    fn active_users(&self) -> Vec<Principal>;

    /// Create a user principal.
    fn create_user(&self, name: &str) -> SecurityResult<Principal>;

    /// Create a group, validating case-insensitive name uniqueness within
    /// its container scope.
    fn create_group(&self, name: &str, container: Option<ContainerId>) -> SecurityResult<Group>;

    /// Rename a group. System groups cannot be renamed.
    fn rename_group(&self, id: PrincipalId, new_name: &str) -> SecurityResult<()>;

    fn deactivate_user(&self, id: PrincipalId) -> SecurityResult<()>;

    /// Remove the principal row. Membership edges and role assignments are
    /// cleaned up by the caller (the security service) before this runs.
    fn delete(&self, id: PrincipalId) -> SecurityResult<()>;
}

struct DirectoryState {
    by_id: BTreeMap<PrincipalId, Principal>,
    next_id: i32,
}

/// In-memory principal directory.
///
/// Intended for tests/dev. Not optimized for performance.
pub struct InMemoryPrincipalStore {
    inner: RwLock<DirectoryState>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        let mut by_id = BTreeMap::new();
        for group in [
            Group::administrators(),
            Group::users(),
            Group::guests(),
            Group::developers(),
        ] {
            by_id.insert(group.id, group.as_principal());
        }
        by_id.insert(
            PrincipalId::GUEST_USER,
            Principal {
                id: PrincipalId::GUEST_USER,
                name: "guest".to_string(),
                kind: PrincipalType::User,
                container: None,
                active: true,
            },
        );

        Self {
            inner: RwLock::new(DirectoryState { by_id, next_id: 1000 }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DirectoryState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DirectoryState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn name_taken(state: &DirectoryState, name: &str, scope: Option<ContainerId>) -> bool {
        state
            .by_id
            .values()
            .any(|p| p.container == scope && p.name.eq_ignore_ascii_case(name))
    }

    fn validated_name(name: &str) -> SecurityResult<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(SecurityError::validation("name cannot be blank"));
        }
        Ok(trimmed.to_string())
    }
}

impl Default for InMemoryPrincipalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PrincipalStore for InMemoryPrincipalStore {
    fn find_by_id(&self, id: PrincipalId) -> Option<Principal> {
        self.read().by_id.get(&id).cloned()
    }

    fn find_by_name(&self, name: &str, scope: Option<ContainerId>) -> Option<Principal> {
        self.read()
            .by_id
            .values()
            .find(|p| p.container == scope && p.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn is_active(&self, id: PrincipalId) -> bool {
        self.read().by_id.get(&id).map(|p| p.active).unwrap_or(false)
    }

    fn active_users(&self) -> Vec<Principal> {
        self.read()
            .by_id
            .values()
            .filter(|p| p.is_user() && p.active && p.id != PrincipalId::GUEST_USER)
            .cloned()
            .collect()
    }

    fn create_user(&self, name: &str) -> SecurityResult<Principal> {
        let name = Self::validated_name(name)?;
        let mut state = self.write();
        if Self::name_taken(&state, &name, None) {
            return Err(SecurityError::validation(format!(
                "a principal named '{name}' already exists"
            )));
        }

        let id = PrincipalId::new(state.next_id);
        state.next_id += 1;
        let principal = Principal {
            id,
            name,
            kind: PrincipalType::User,
            container: None,
            active: true,
        };
        state.by_id.insert(id, principal.clone());
        debug!(user = %principal.name, id = %id, "created user");
        Ok(principal)
    }

    fn create_group(&self, name: &str, container: Option<ContainerId>) -> SecurityResult<Group> {
        let name = Self::validated_name(name)?;
        let mut state = self.write();
        if Self::name_taken(&state, &name, container) {
            return Err(SecurityError::validation(format!(
                "a group named '{name}' already exists in this scope"
            )));
        }

        let id = PrincipalId::new(state.next_id);
        state.next_id += 1;
        let group = Group {
            id,
            name,
            container,
        };
        state.by_id.insert(id, group.as_principal());
        debug!(group = %group.name, id = %id, "created group");
        Ok(group)
    }

    fn rename_group(&self, id: PrincipalId, new_name: &str) -> SecurityResult<()> {
        if id.is_system_group() {
            return Err(SecurityError::validation("system groups cannot be renamed"));
        }
        let new_name = Self::validated_name(new_name)?;

        let mut state = self.write();
        let scope = match state.by_id.get(&id) {
            Some(p) if p.is_group() => p.container,
            _ => return Err(SecurityError::not_found(format!("group {id}"))),
        };
        let clash = state
            .by_id
            .values()
            .any(|p| p.id != id && p.container == scope && p.name.eq_ignore_ascii_case(&new_name));
        if clash {
            return Err(SecurityError::validation(format!(
                "a group named '{new_name}' already exists in this scope"
            )));
        }

        if let Some(p) = state.by_id.get_mut(&id) {
            p.name = new_name;
        }
        Ok(())
    }

    fn deactivate_user(&self, id: PrincipalId) -> SecurityResult<()> {
        let mut state = self.write();
        match state.by_id.get_mut(&id) {
            Some(p) if p.is_user() => {
                p.active = false;
                Ok(())
            }
            _ => Err(SecurityError::not_found(format!("user {id}"))),
        }
    }

    fn delete(&self, id: PrincipalId) -> SecurityResult<()> {
        if id.is_system_group() {
            return Err(SecurityError::validation("system groups cannot be deleted"));
        }
        let mut state = self.write();
        if state.by_id.remove(&id).is_none() {
            return Err(SecurityError::not_found(format!("principal {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_system_groups_and_guest() {
        let store = InMemoryPrincipalStore::new();
        assert!(store.find_by_id(PrincipalId::ADMINISTRATORS).is_some());
        assert!(store.find_by_id(PrincipalId::USERS).is_some());
        assert!(store.find_by_id(PrincipalId::GUESTS).is_some());
        assert!(store.find_by_id(PrincipalId::DEVELOPERS).is_some());
        assert!(store.find_by_id(PrincipalId::GUEST_USER).is_some());
    }

    #[test]
    fn group_names_are_unique_case_insensitively_within_scope() {
        let store = InMemoryPrincipalStore::new();
        let container = ContainerId::new();

        store.create_group("Analysts", Some(container)).unwrap();
        let err = store.create_group("analysts", Some(container)).unwrap_err();
        assert!(matches!(err, SecurityError::Validation(_)));
    }

    #[test]
    fn same_name_in_different_scopes_is_allowed() {
        let store = InMemoryPrincipalStore::new();
        let a = ContainerId::new();
        let b = ContainerId::new();

        let g1 = store.create_group("Analysts", Some(a)).unwrap();
        let g2 = store.create_group("Analysts", Some(b)).unwrap();
        assert_ne!(g1.id, g2.id);
    }

    #[test]
    fn site_scope_clashes_with_system_group_names() {
        let store = InMemoryPrincipalStore::new();
        let err = store.create_group("administrators", None).unwrap_err();
        assert!(matches!(err, SecurityError::Validation(_)));
    }

    #[test]
    fn blank_group_name_is_rejected() {
        let store = InMemoryPrincipalStore::new();
        let err = store.create_group("   ", None).unwrap_err();
        assert!(matches!(err, SecurityError::Validation(_)));
    }

    #[test]
    fn system_groups_cannot_be_renamed_or_deleted() {
        let store = InMemoryPrincipalStore::new();
        assert!(matches!(
            store.rename_group(PrincipalId::GUESTS, "Visitors"),
            Err(SecurityError::Validation(_))
        ));
        assert!(matches!(
            store.delete(PrincipalId::ADMINISTRATORS),
            Err(SecurityError::Validation(_))
        ));
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        let store = InMemoryPrincipalStore::new();
        let container = ContainerId::new();
        let group = store.create_group("Analysts", Some(container)).unwrap();

        let found = store.find_by_name("ANALYSTS", Some(container)).unwrap();
        assert_eq!(found.id, group.id);
        assert!(store.find_by_name("ANALYSTS", None).is_none());
    }

    #[test]
    fn active_users_excludes_guest_and_inactive() {
        let store = InMemoryPrincipalStore::new();
        let alice = store.create_user("alice").unwrap();
        let bob = store.create_user("bob").unwrap();
        store.deactivate_user(bob.id).unwrap();

        let users = store.active_users();
        assert!(users.iter().any(|p| p.id == alice.id));
        assert!(users.iter().all(|p| p.id != bob.id));
        assert!(users.iter().all(|p| p.id != PrincipalId::GUEST_USER));
        assert!(!store.is_active(bob.id));
    }

    #[test]
    fn deleted_principal_is_gone() {
        let store = InMemoryPrincipalStore::new();
        let group = store.create_group("Temp", None).unwrap();
        store.delete(group.id).unwrap();
        assert!(store.find_by_id(group.id).is_none());
        assert!(matches!(
            store.delete(group.id),
            Err(SecurityError::NotFound(_))
        ));
    }
}
