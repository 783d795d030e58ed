//! The group-membership graph.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use palisade_core::{
    LoadingCache, MembershipChange, NotificationBus, PrincipalId, SecurityError,
    SecurityNotification, SecurityResult,
};
use palisade_principals::{Group, Principal, PrincipalStore};

use crate::edges::MembershipStore;

/// Maintains direct group→member edges and answers transitive-closure
/// queries over them.
///
/// All operations are safe under concurrent invocation. Closures are cached
/// per principal id; any successful edge mutation clears the closure cache
/// (a single edge can change the closure of unboundedly many principals)
/// and publishes a change notification for dependents.
pub struct GroupMembershipGraph {
    edges: Arc<dyn MembershipStore>,
    principals: Arc<dyn PrincipalStore>,
    closures: LoadingCache<PrincipalId, BTreeSet<PrincipalId>>,
    bus: Arc<NotificationBus>,
}

impl GroupMembershipGraph {
    pub fn new(
        edges: Arc<dyn MembershipStore>,
        principals: Arc<dyn PrincipalStore>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        Self {
            edges,
            principals,
            closures: LoadingCache::new(),
            bus,
        }
    }

    /// Add `member` as a direct member of `group`.
    ///
    /// Every invariant is checked before the edge becomes visible; a failed
    /// call leaves the graph unchanged. The cycle check inserts the edge
    /// tentatively and walks the member direction from `group`: if `group`
    /// is reachable from itself the insertion is rolled back. This proves no
    /// cycle *through the modified group*; a concurrent writer could in
    /// principle complete a cycle through unrelated edges; closure walks
    /// stay terminating on such data regardless (visited sets).
    pub fn add_member(&self, group: &Group, member: &Principal) -> SecurityResult<()> {
        let stored_group = self
            .principals
            .find_by_id(group.id)
            .filter(Principal::is_group)
            .ok_or_else(|| SecurityError::validation(format!("group {} does not exist", group.id)))?;
        let stored_member = self.principals.find_by_id(member.id).ok_or_else(|| {
            SecurityError::validation(format!("principal {} does not exist", member.id))
        })?;

        if group.id == PrincipalId::GUESTS || group.id == PrincipalId::USERS {
            return Err(SecurityError::validation(format!(
                "members cannot be added to the {} group; its membership is implicit",
                stored_group.name
            )));
        }
        if group.id == member.id {
            return Err(SecurityError::validation(
                "a group cannot be a member of itself",
            ));
        }
        if self.edges.contains(group.id, member.id) {
            return Err(SecurityError::validation(format!(
                "{} is already a member of {}",
                stored_member.name, stored_group.name
            )));
        }
        if stored_member.id.is_system_group() {
            return Err(SecurityError::validation(
                "system groups cannot be members of any group",
            ));
        }
        if stored_member.is_group() {
            if group.id.is_system_group() {
                return Err(SecurityError::validation(
                    "groups cannot be added to a system group",
                ));
            }
            self.check_scope(&stored_group, &stored_member)?;
        }

        // Tentative insert, then re-validate reachability from the root.
        self.edges.insert(group.id, member.id)?;
        if self.reaches(group.id, group.id) {
            self.edges.remove(group.id, member.id);
            return Err(SecurityError::validation(format!(
                "adding {} to {} would create a circular group membership",
                stored_member.name, stored_group.name
            )));
        }

        self.closures.clear();
        debug!(group = %group.id, member = %member.id, "membership edge added");
        self.bus.publish(SecurityNotification::MembershipChanged {
            group: group.id,
            member: member.id,
            change: MembershipChange::Added,
        });
        Ok(())
    }

    /// Remove a direct membership edge.
    ///
    /// Removing a non-member is a silent no-op at the edge level, but caches
    /// are still invalidated and the removal notification still fires.
    pub fn remove_member(&self, group: &Group, member: &Principal) -> bool {
        let removed = self.edges.remove(group.id, member.id);
        self.closures.clear();
        debug!(group = %group.id, member = %member.id, removed, "membership edge removed");
        self.bus.publish(SecurityNotification::MembershipChanged {
            group: group.id,
            member: member.id,
            change: MembershipChange::Removed,
        });
        removed
    }

    /// Remove every edge touching `principal` (group-deletion path).
    pub fn remove_all_for(&self, principal: PrincipalId) -> usize {
        let removed = self.edges.remove_all(principal);
        self.closures.clear();
        removed
    }

    /// Direct members of `group` (one hop).
    pub fn direct_members(&self, group: &Group) -> Vec<Principal> {
        self.edges
            .direct_members(group.id)
            .into_iter()
            .filter_map(|id| self.principals.find_by_id(id))
            .collect()
    }

    /// Transitive closure of group memberships for `principal`, including
    /// the principal's own id and the implicit memberships (every user is a
    /// member of Guests; every non-guest user additionally of Users).
    ///
    /// Results are cached and shared between concurrent callers.
    pub fn all_groups_for(&self, principal: &Principal) -> SecurityResult<Arc<BTreeSet<PrincipalId>>> {
        let edges = self.edges.clone();
        let seed = Self::closure_seed(principal);
        self.closures.get_or_load(principal.id, move || {
            let mut visited = seed.clone();
            let mut worklist: Vec<PrincipalId> = seed.into_iter().collect();
            while let Some(id) = worklist.pop() {
                for g in edges.direct_groups(id) {
                    if visited.insert(g) {
                        worklist.push(g);
                    }
                }
            }
            Ok(visited)
        })
    }

    /// All members of `group`, direct and nested.
    ///
    /// The synthetic Users group is not materialized in the edge store; its
    /// membership is every active user, fetched from the principal store,
    /// both when it is the queried group and when it is nested inside one.
    pub fn all_members_of(&self, group: &Group) -> Vec<Principal> {
        let mut result: Vec<Principal> = Vec::new();
        let mut seen: BTreeSet<PrincipalId> = BTreeSet::new();
        let mut visited: BTreeSet<PrincipalId> = BTreeSet::new();
        let mut worklist = vec![group.id];
        visited.insert(group.id);

        while let Some(gid) = worklist.pop() {
            if gid == PrincipalId::USERS {
                for user in self.principals.active_users() {
                    if seen.insert(user.id) {
                        result.push(user);
                    }
                }
                continue;
            }
            for mid in self.edges.direct_members(gid) {
                let Some(member) = self.principals.find_by_id(mid) else {
                    continue;
                };
                if member.is_group() && visited.insert(mid) {
                    worklist.push(mid);
                }
                if seen.insert(mid) {
                    result.push(member);
                }
            }
        }
        result
    }

    fn closure_seed(principal: &Principal) -> BTreeSet<PrincipalId> {
        let mut seed = BTreeSet::new();
        seed.insert(principal.id);
        if principal.is_user() {
            seed.insert(PrincipalId::GUESTS);
            if principal.id != PrincipalId::GUEST_USER {
                seed.insert(PrincipalId::USERS);
            }
        }
        seed
    }

    /// Scope invariant: a project-scoped group may only contain members from
    /// the same project or site-wide groups; a site-wide group cannot
    /// contain a project-scoped group.
    fn check_scope(&self, group: &Principal, member: &Principal) -> SecurityResult<()> {
        match (group.container, member.container) {
            (_, None) => Ok(()),
            (Some(gc), Some(mc)) if gc == mc => Ok(()),
            (Some(_), Some(_)) => Err(SecurityError::validation(
                "a project group can only contain groups from the same project",
            )),
            (None, Some(_)) => Err(SecurityError::validation(
                "a site-wide group cannot contain a project group",
            )),
        }
    }

    /// Whether `target` is reachable by following member edges from `from`,
    /// excluding the trivial zero-length path. Iterative walk with a visited
    /// set, so it terminates even on historically imported cyclic data.
    fn reaches(&self, from: PrincipalId, target: PrincipalId) -> bool {
        let mut visited: BTreeSet<PrincipalId> = BTreeSet::new();
        let mut worklist = vec![from];
        while let Some(id) = worklist.pop() {
            for m in self.edges.direct_members(id) {
                if m == target {
                    return true;
                }
                if visited.insert(m) {
                    worklist.push(m);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::InMemoryMembershipStore;
    use palisade_core::ContainerId;
    use palisade_principals::InMemoryPrincipalStore;
    use proptest::prelude::*;

    struct Fixture {
        graph: GroupMembershipGraph,
        principals: Arc<InMemoryPrincipalStore>,
    }

    fn fixture() -> Fixture {
        let principals = Arc::new(InMemoryPrincipalStore::new());
        let graph = GroupMembershipGraph::new(
            Arc::new(InMemoryMembershipStore::new()),
            principals.clone(),
            Arc::new(NotificationBus::new()),
        );
        Fixture { graph, principals }
    }

    fn group(f: &Fixture, name: &str, container: Option<ContainerId>) -> Group {
        f.principals.create_group(name, container).unwrap()
    }

    fn user(f: &Fixture, name: &str) -> Principal {
        f.principals.create_user(name).unwrap()
    }

    #[test]
    fn self_membership_is_rejected() {
        let f = fixture();
        let g = group(&f, "G", None);
        let err = f.graph.add_member(&g, &g.as_principal()).unwrap_err();
        assert!(matches!(err, SecurityError::Validation(_)));
    }

    #[test]
    fn duplicate_membership_is_rejected_without_side_effects() {
        let f = fixture();
        let g = group(&f, "G", None);
        let alice = user(&f, "alice");

        f.graph.add_member(&g, &alice).unwrap();
        let err = f.graph.add_member(&g, &alice).unwrap_err();
        assert!(matches!(err, SecurityError::Validation(_)));
        assert_eq!(f.graph.direct_members(&g).len(), 1);
    }

    #[test]
    fn cycle_through_a_chain_is_rejected_and_rolled_back() {
        let f = fixture();
        let g1 = group(&f, "G1", None);
        let g2 = group(&f, "G2", None);
        let g3 = group(&f, "G3", None);

        f.graph.add_member(&g1, &g2.as_principal()).unwrap();
        f.graph.add_member(&g2, &g3.as_principal()).unwrap();

        let err = f.graph.add_member(&g3, &g1.as_principal()).unwrap_err();
        assert!(matches!(err, SecurityError::Validation(_)));
        // The tentative edge was removed again.
        assert!(f.graph.direct_members(&g3).is_empty());
    }

    #[test]
    fn guests_and_users_accept_no_members() {
        let f = fixture();
        let alice = user(&f, "alice");

        for target in [Group::guests(), Group::users()] {
            let err = f.graph.add_member(&target, &alice).unwrap_err();
            assert!(matches!(err, SecurityError::Validation(_)));
        }
    }

    #[test]
    fn system_groups_cannot_be_members() {
        let f = fixture();
        let g = group(&f, "G", None);
        let err = f
            .graph
            .add_member(&g, &Group::developers().as_principal())
            .unwrap_err();
        assert!(matches!(err, SecurityError::Validation(_)));
    }

    #[test]
    fn groups_cannot_join_system_groups_but_users_can() {
        let f = fixture();
        let g = group(&f, "G", None);
        let alice = user(&f, "alice");
        let admins = Group::administrators();

        let err = f.graph.add_member(&admins, &g.as_principal()).unwrap_err();
        assert!(matches!(err, SecurityError::Validation(_)));

        f.graph.add_member(&admins, &alice).unwrap();
        assert_eq!(f.graph.direct_members(&admins).len(), 1);
    }

    #[test]
    fn scope_invariants() {
        let f = fixture();
        let project_x = ContainerId::new();
        let project_y = ContainerId::new();
        let px = group(&f, "PX", Some(project_x));
        let py = group(&f, "PY", Some(project_y));
        let px2 = group(&f, "PX2", Some(project_x));
        let site = group(&f, "Site", None);

        // Cross-project: rejected.
        let err = f.graph.add_member(&px, &py.as_principal()).unwrap_err();
        assert!(matches!(err, SecurityError::Validation(_)));

        // Site group cannot contain a project group.
        let err = f.graph.add_member(&site, &px.as_principal()).unwrap_err();
        assert!(matches!(err, SecurityError::Validation(_)));

        // Same project and site-wide members are fine.
        f.graph.add_member(&px, &px2.as_principal()).unwrap();
        f.graph.add_member(&px, &site.as_principal()).unwrap();
    }

    #[test]
    fn absent_principals_are_rejected() {
        let f = fixture();
        let g = group(&f, "G", None);
        let ghost = Principal {
            id: PrincipalId::new(9999),
            name: "ghost".to_string(),
            kind: palisade_principals::PrincipalType::User,
            container: None,
            active: true,
        };
        assert!(f.graph.add_member(&g, &ghost).is_err());

        let phantom_group = Group {
            id: PrincipalId::new(8888),
            name: "phantom".to_string(),
            container: None,
        };
        let alice = user(&f, "alice");
        assert!(f.graph.add_member(&phantom_group, &alice).is_err());
    }

    #[test]
    fn closure_includes_nested_groups_and_implicit_memberships() {
        let f = fixture();
        let all = group(&f, "All", None);
        let dev = group(&f, "Dev", None);
        let alice = user(&f, "alice");

        f.graph.add_member(&all, &dev.as_principal()).unwrap();
        f.graph.add_member(&dev, &alice).unwrap();

        let closure = f.graph.all_groups_for(&alice).unwrap();
        assert!(closure.contains(&alice.id));
        assert!(closure.contains(&dev.id));
        assert!(closure.contains(&all.id));
        assert!(closure.contains(&PrincipalId::GUESTS));
        assert!(closure.contains(&PrincipalId::USERS));
    }

    #[test]
    fn guest_closure_omits_users_group() {
        let f = fixture();
        let guest = f.principals.find_by_id(PrincipalId::GUEST_USER).unwrap();

        let closure = f.graph.all_groups_for(&guest).unwrap();
        assert!(closure.contains(&PrincipalId::GUESTS));
        assert!(!closure.contains(&PrincipalId::USERS));
    }

    #[test]
    fn group_closure_has_no_implicit_memberships() {
        let f = fixture();
        let g = group(&f, "G", None);
        let closure = f.graph.all_groups_for(&g.as_principal()).unwrap();
        assert_eq!(closure.len(), 1);
        assert!(closure.contains(&g.id));
    }

    #[test]
    fn closure_cache_is_invalidated_by_removal() {
        let f = fixture();
        let dev = group(&f, "Dev", None);
        let alice = user(&f, "alice");

        f.graph.add_member(&dev, &alice).unwrap();
        assert!(f.graph.all_groups_for(&alice).unwrap().contains(&dev.id));

        f.graph.remove_member(&dev, &alice);
        assert!(!f.graph.all_groups_for(&alice).unwrap().contains(&dev.id));
    }

    #[test]
    fn removal_notification_fires_even_for_non_members() {
        let f = fixture();
        let dev = group(&f, "Dev", None);
        let alice = user(&f, "alice");
        let bus = Arc::new(NotificationBus::new());
        let graph = GroupMembershipGraph::new(
            Arc::new(InMemoryMembershipStore::new()),
            f.principals.clone(),
            bus.clone(),
        );
        let sub = bus.subscribe();

        assert!(!graph.remove_member(&dev, &alice));
        assert_eq!(
            sub.drain(),
            vec![SecurityNotification::MembershipChanged {
                group: dev.id,
                member: alice.id,
                change: MembershipChange::Removed,
            }]
        );
    }

    #[test]
    fn recursive_members_with_synthetic_users_group() {
        let f = fixture();
        let outer = group(&f, "Outer", None);
        let inner = group(&f, "Inner", None);
        let alice = user(&f, "alice");
        let bob = user(&f, "bob");

        f.graph.add_member(&outer, &inner.as_principal()).unwrap();
        f.graph.add_member(&inner, &alice.clone()).unwrap();

        let members = f.graph.all_members_of(&outer);
        let ids: BTreeSet<PrincipalId> = members.iter().map(|p| p.id).collect();
        assert!(ids.contains(&inner.id));
        assert!(ids.contains(&alice.id));
        assert!(!ids.contains(&bob.id));

        // Nesting Users pulls in every active user without any edges.
        f.graph
            .add_member(&inner, &Group::users().as_principal())
            .unwrap_err();
        // Users cannot be nested via add_member (system group as member), so
        // query it directly.
        let everyone = f.graph.all_members_of(&Group::users());
        let ids: BTreeSet<PrincipalId> = everyone.iter().map(|p| p.id).collect();
        assert!(ids.contains(&alice.id));
        assert!(ids.contains(&bob.id));
        assert!(!ids.contains(&PrincipalId::GUEST_USER));
    }

    #[test]
    fn closure_terminates_on_imported_cyclic_data() {
        // Cycles can exist in data imported from before cycle prevention;
        // walks must terminate on them.
        let f = fixture();
        let g1 = group(&f, "G1", None);
        let g2 = group(&f, "G2", None);
        let edges = InMemoryMembershipStore::new();
        edges.insert(g1.id, g2.id).unwrap();
        edges.insert(g2.id, g1.id).unwrap();
        let graph = GroupMembershipGraph::new(
            Arc::new(edges),
            f.principals.clone(),
            Arc::new(NotificationBus::new()),
        );

        let closure = graph.all_groups_for(&g2.as_principal()).unwrap();
        assert!(closure.contains(&g1.id));
        assert!(closure.contains(&g2.id));
        assert_eq!(graph.all_members_of(&g1).len(), 2);
    }

    proptest! {
        /// After any sequence of accepted add_member calls, no group can
        /// reach itself through member edges.
        #[test]
        fn graph_stays_acyclic(ops in proptest::collection::vec((0usize..8, 0usize..8), 0..40)) {
            let f = fixture();
            let groups: Vec<Group> = (0..8)
                .map(|i| group(&f, &format!("G{i}"), None))
                .collect();

            for (gi, mi) in ops {
                let _ = f.graph.add_member(&groups[gi], &groups[mi].as_principal());
            }

            for g in &groups {
                prop_assert!(!f.graph.reaches(g.id, g.id));
            }
        }
    }
}
