//! Permission resolution.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use palisade_core::{PrincipalId, SecurableResource};
use palisade_graph::GroupMembershipGraph;
use palisade_policy::PolicyStore;
use palisade_principals::User;
use palisade_registry::{Permission, PermissionSet, Registry, Role};

/// Answers "may this user do that to this resource".
///
/// Resolution never fails: every degraded condition (inactive user, closure
/// lookup failure, unregistered permission) collapses to "not granted".
pub struct PermissionResolver {
    graph: Arc<GroupMembershipGraph>,
    policies: Arc<PolicyStore>,
    registry: Arc<Registry>,
}

impl PermissionResolver {
    pub fn new(
        graph: Arc<GroupMembershipGraph>,
        policies: Arc<PolicyStore>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            graph,
            policies,
            registry,
        }
    }

    /// The full permission set `user` holds on `resource`.
    ///
    /// Order matters: an inactive user and a container outside an
    /// impersonation restriction short-circuit to the empty set before any
    /// policy is consulted; contextual roles are added after the policy
    /// grants; the impersonation filter runs last so it can only narrow.
    pub fn effective_permissions(
        &self,
        user: &User,
        resource: &dyn SecurableResource,
    ) -> PermissionSet {
        self.effective_permissions_with(user, resource, &[])
    }

    /// Like [`effective_permissions`](Self::effective_permissions), with
    /// extra caller-supplied contextual roles (pipeline contexts that grant
    /// roles outside the assignment table).
    pub fn effective_permissions_with(
        &self,
        user: &User,
        resource: &dyn SecurableResource,
        contextual: &[Role],
    ) -> PermissionSet {
        if !user.active {
            return PermissionSet::new();
        }
        if let Some(ctx) = &user.impersonation {
            if !ctx.allows_container(resource.container_id()) {
                return PermissionSet::new();
            }
        }

        let policy = self.policies.policy(resource);
        let closure = self.membership_closure(user);
        let mut granted = policy.own_permissions(&closure);
        for role in user.contextual_roles().iter().chain(contextual) {
            granted.extend(role.permissions());
        }

        match &user.impersonation {
            Some(ctx) => ctx.filter.apply(granted),
            None => granted,
        }
    }

    /// Whether `user` holds every permission in `wanted` on `resource`.
    /// An empty `wanted` set is not granted.
    pub fn has_all(
        &self,
        user: &User,
        resource: &dyn SecurableResource,
        wanted: &[Permission],
    ) -> bool {
        if wanted.is_empty() {
            return false;
        }
        let granted = self.effective_permissions(user, resource);
        wanted
            .iter()
            .all(|&p| self.registry.check_registered(p) && granted.contains(&p))
    }

    /// Whether `user` holds at least one permission in `wanted` on
    /// `resource`.
    pub fn has_any(
        &self,
        user: &User,
        resource: &dyn SecurableResource,
        wanted: &[Permission],
    ) -> bool {
        let granted = self.effective_permissions(user, resource);
        wanted
            .iter()
            .any(|&p| self.registry.check_registered(p) && granted.contains(&p))
    }

    /// The roles `user` holds on `resource`, through the policy and through
    /// the impersonation context. Role listing is not narrowed by the
    /// impersonation filter; only permission grants are.
    pub fn effective_roles(&self, user: &User, resource: &dyn SecurableResource) -> BTreeSet<Role> {
        if !user.active {
            return BTreeSet::new();
        }
        if let Some(ctx) = &user.impersonation {
            if !ctx.allows_container(resource.container_id()) {
                return BTreeSet::new();
            }
        }

        let policy = self.policies.policy(resource);
        let mut roles = policy.roles_for(&self.membership_closure(user));
        roles.extend(user.contextual_roles());
        roles
    }

    /// Group closure for `user`, degrading to the identity plus implicit
    /// memberships when the graph lookup fails. Grants are then incomplete
    /// rather than the request failing.
    fn membership_closure(&self, user: &User) -> BTreeSet<PrincipalId> {
        match self.graph.all_groups_for(&user.as_principal()) {
            Ok(closure) => closure.as_ref().clone(),
            Err(e) => {
                warn!(user = %user.id, error = %e, "group closure lookup failed; resolving with implicit memberships only");
                let mut minimal = BTreeSet::from([user.id, PrincipalId::GUESTS]);
                if !user.is_guest() {
                    minimal.insert(PrincipalId::USERS);
                }
                minimal
            }
        }
    }
}
