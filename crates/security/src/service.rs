//! The security service facade.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use palisade_audit::{AuditSink, InMemoryAuditSink};
use palisade_core::{
    ContainerId, NotificationBus, PrincipalId, Resource, SecurableResource, SecurityError,
    SecurityNotification, SecurityResult, Subscription,
};
use palisade_graph::{GroupMembershipGraph, InMemoryMembershipStore};
use palisade_policy::{
    Actor, InMemoryPolicyPersistence, MutablePolicy, PolicyStore, SecurityPolicy,
};
use palisade_principals::{Group, InMemoryPrincipalStore, Principal, PrincipalStore, User};
use palisade_registry::{Permission, PermissionSet, Registry, Role};

use crate::resolver::PermissionResolver;

/// One object wiring the principal directory, the membership graph, the
/// policy store and the resolver together.
///
/// Multi-step mutations (group deletion, project bootstrap) live here so the
/// lower crates stay single-purpose.
pub struct SecurityService {
    principals: Arc<dyn PrincipalStore>,
    graph: Arc<GroupMembershipGraph>,
    policies: Arc<PolicyStore>,
    resolver: PermissionResolver,
    registry: Arc<Registry>,
    bus: Arc<NotificationBus>,
}

impl SecurityService {
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        graph: Arc<GroupMembershipGraph>,
        policies: Arc<PolicyStore>,
        registry: Arc<Registry>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        let resolver = PermissionResolver::new(graph.clone(), policies.clone(), registry.clone());
        Self {
            principals,
            graph,
            policies,
            resolver,
            registry,
            bus,
        }
    }

    /// Fully in-memory wiring: seeded principal directory, empty graph and
    /// policy tables, all permissions registered, audit to memory.
    pub fn in_memory() -> (Self, Arc<InMemoryAuditSink>) {
        let audit = Arc::new(InMemoryAuditSink::new());
        let service = Self::with_audit_sink(audit.clone());
        (service, audit)
    }

    /// In-memory wiring with a caller-chosen audit sink.
    pub fn with_audit_sink(audit: Arc<dyn AuditSink>) -> Self {
        let bus = Arc::new(NotificationBus::new());
        let principals: Arc<dyn PrincipalStore> = Arc::new(InMemoryPrincipalStore::new());
        let graph = Arc::new(GroupMembershipGraph::new(
            Arc::new(InMemoryMembershipStore::new()),
            principals.clone(),
            bus.clone(),
        ));
        let policies = Arc::new(PolicyStore::new(
            Arc::new(InMemoryPolicyPersistence::new()),
            audit,
            bus.clone(),
        ));
        Self::new(
            principals,
            graph,
            policies,
            Arc::new(Registry::with_defaults()),
            bus,
        )
    }

    pub fn principals(&self) -> &Arc<dyn PrincipalStore> {
        &self.principals
    }

    pub fn graph(&self) -> &GroupMembershipGraph {
        &self.graph
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Subscribe to security change notifications.
    pub fn notifications(&self) -> Subscription {
        self.bus.subscribe()
    }

    // Group lifecycle.

    pub fn create_group(
        &self,
        name: &str,
        container: Option<ContainerId>,
    ) -> SecurityResult<Group> {
        self.principals.create_group(name, container)
    }

    pub fn rename_group(&self, group: PrincipalId, new_name: &str) -> SecurityResult<()> {
        self.principals.rename_group(group, new_name)
    }

    /// Delete a group: membership edges first, then every role assignment
    /// referencing it, then the principal row. The order means a concurrent
    /// resolution sees at worst a group with no members and no grants.
    pub fn delete_group(&self, group: PrincipalId, acting_user: &User) -> SecurityResult<()> {
        let principal = self
            .principals
            .find_by_id(group)
            .ok_or_else(|| SecurityError::not_found(format!("group {group}")))?;
        if !principal.is_group() {
            return Err(SecurityError::validation(format!(
                "{} is not a group",
                principal.name
            )));
        }
        if group.is_system_group() {
            return Err(SecurityError::validation("system groups cannot be deleted"));
        }

        self.graph.remove_all_for(group);
        self.policies.strip_principal(group, &self.actor(acting_user))?;
        self.principals.delete(group)?;
        info!(group = %group, name = %principal.name, "group deleted");
        self.bus
            .publish(SecurityNotification::PrincipalDeleted { principal: group });
        Ok(())
    }

    pub fn add_member(&self, group: &Group, member: &Principal) -> SecurityResult<()> {
        self.graph.add_member(group, member)
    }

    pub fn remove_member(&self, group: &Group, member: &Principal) -> bool {
        self.graph.remove_member(group, member)
    }

    // Policies.

    pub fn save_policy(&self, policy: &MutablePolicy, acting_user: &User) -> SecurityResult<bool> {
        self.policies.save_policy(policy, &self.actor(acting_user))
    }

    pub fn get_policy(&self, resource: &dyn SecurableResource) -> Arc<SecurityPolicy> {
        self.policies.policy(resource)
    }

    pub fn delete_policy(
        &self,
        resource: &dyn SecurableResource,
        acting_user: &User,
    ) -> SecurityResult<()> {
        self.policies
            .delete_policy(resource.resource_id(), &self.actor(acting_user))
    }

    // Resolution.

    pub fn effective_permissions(
        &self,
        user: &User,
        resource: &dyn SecurableResource,
    ) -> PermissionSet {
        self.resolver.effective_permissions(user, resource)
    }

    pub fn has_all_permissions(
        &self,
        user: &User,
        resource: &dyn SecurableResource,
        wanted: &[Permission],
    ) -> bool {
        self.resolver.has_all(user, resource, wanted)
    }

    pub fn has_any_permissions(
        &self,
        user: &User,
        resource: &dyn SecurableResource,
        wanted: &[Permission],
    ) -> bool {
        self.resolver.has_any(user, resource, wanted)
    }

    pub fn effective_roles(&self, user: &User, resource: &dyn SecurableResource) -> BTreeSet<Role> {
        self.resolver.effective_roles(user, resource)
    }

    // Project bootstrap.

    /// Seed a freshly created project: a project-scoped "Users" group, and a
    /// pinned root policy (NoPermissions to Guests) so the project does not
    /// inherit site-wide grants. Returns the project group.
    pub fn create_project_defaults(
        &self,
        container: ContainerId,
        acting_user: &User,
    ) -> SecurityResult<Group> {
        let project_users = self.principals.create_group("Users", Some(container))?;

        let root = Resource::container_root(container, None);
        let mut policy = MutablePolicy::new(&root);
        policy.add_role_assignment(PrincipalId::GUESTS, Role::NoPermissions)?;
        policy.add_role_assignment(project_users.id, Role::Reader)?;
        self.save_policy(&policy, acting_user)?;

        info!(container = %container, group = %project_users.id, "project security defaults created");
        Ok(project_users)
    }

    /// Site-administration rights come from transitive membership in the
    /// Administrators group.
    fn actor(&self, user: &User) -> Actor {
        let elevated = self
            .graph
            .all_groups_for(&user.as_principal())
            .map(|closure| closure.contains(&PrincipalId::ADMINISTRATORS))
            .unwrap_or(false);
        Actor::new(user.id, elevated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_core::ResourceId;

    fn service() -> SecurityService {
        SecurityService::in_memory().0
    }

    fn user(s: &SecurityService, name: &str) -> User {
        let p = s.principals().create_user(name).unwrap();
        User::new(p.id, p.name)
    }

    fn admin(s: &SecurityService) -> User {
        let u = user(s, "site-admin");
        s.add_member(&Group::administrators(), &u.as_principal())
            .unwrap();
        u
    }

    #[test]
    fn delete_group_scrubs_edges_and_assignments() {
        let s = service();
        let admin = admin(&s);
        let g = s.create_group("Analysts", None).unwrap();
        let alice = user(&s, "alice");
        s.add_member(&g, &alice.as_principal()).unwrap();

        let resource = Resource::site(ResourceId::new());
        let mut policy = MutablePolicy::new(&resource);
        policy.add_role_assignment(g.id, Role::Editor).unwrap();
        s.save_policy(&policy, &admin).unwrap();

        s.delete_group(g.id, &admin).unwrap();

        assert!(s.principals().find_by_id(g.id).is_none());
        assert!(s.get_policy(&resource).assigned_roles(g.id).is_empty());
        assert!(s
            .graph()
            .all_groups_for(&alice.as_principal())
            .unwrap()
            .iter()
            .all(|&id| id != g.id));
    }

    #[test]
    fn delete_group_rejects_users_and_system_groups() {
        let s = service();
        let admin = admin(&s);
        let alice = user(&s, "alice");

        assert!(matches!(
            s.delete_group(alice.id, &admin),
            Err(SecurityError::Validation(_))
        ));
        assert!(matches!(
            s.delete_group(PrincipalId::GUESTS, &admin),
            Err(SecurityError::Validation(_))
        ));
        assert!(matches!(
            s.delete_group(PrincipalId::new(424242), &admin),
            Err(SecurityError::NotFound(_))
        ));
    }

    #[test]
    fn actor_elevation_follows_administrators_membership() {
        let s = service();
        let plain = user(&s, "plain");
        let nested_admin = user(&s, "nested");
        let relay = s.create_group("Relay", None).unwrap();
        s.add_member(&Group::administrators(), &relay.as_principal())
            .unwrap_err(); // groups cannot join system groups
        s.add_member(&Group::administrators(), &nested_admin.as_principal())
            .unwrap();

        assert!(!s.actor(&plain).elevated);
        assert!(s.actor(&nested_admin).elevated);
    }

    #[test]
    fn project_defaults_pin_the_root_policy() {
        let s = service();
        let admin = admin(&s);
        let site = Resource::site(ResourceId::new());

        // A site-wide grant that the new project must not inherit.
        let mut site_policy = MutablePolicy::new(&site);
        site_policy
            .add_role_assignment(PrincipalId::USERS, Role::Reader)
            .unwrap();
        s.save_policy(&site_policy, &admin).unwrap();

        let container = ContainerId::new();
        let project_users = s.create_project_defaults(container, &admin).unwrap();
        assert_eq!(project_users.container, Some(container));

        let root = Resource::container_root(container, None);
        let policy = s.get_policy(&root);
        assert_eq!(policy.resource(), root.resource_id());
        assert_eq!(
            policy.assigned_roles(project_users.id),
            vec![Role::Reader]
        );
        assert_eq!(
            policy.assigned_roles(PrincipalId::GUESTS),
            vec![Role::NoPermissions]
        );
    }

    #[test]
    fn notifications_cover_the_whole_lifecycle() {
        let s = service();
        let admin = admin(&s);
        let sub = s.notifications();
        let g = s.create_group("Analysts", None).unwrap();
        let alice = user(&s, "alice");

        s.add_member(&g, &alice.as_principal()).unwrap();
        s.delete_group(g.id, &admin).unwrap();

        let events = sub.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            SecurityNotification::MembershipChanged { group, .. } if *group == g.id
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            SecurityNotification::PrincipalDeleted { principal } if *principal == g.id
        )));
    }
}
