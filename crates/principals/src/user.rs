//! Users and impersonation contexts.

use serde::{Deserialize, Serialize};

use palisade_core::{ContainerId, PrincipalId};
use palisade_registry::{Permission, PermissionSet, Role};

use crate::principal::{Principal, PrincipalType};

/// Filter applied to the granted permission set while impersonating.
///
/// The filter runs after every other resolution step and can only narrow,
/// never widen, the granted set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionFilter {
    /// No narrowing; the impersonated user's full grants apply.
    Full,
    /// Strip everything except Read.
    ReadOnly,
}

impl PermissionFilter {
    pub fn apply(&self, granted: PermissionSet) -> PermissionSet {
        match self {
            PermissionFilter::Full => granted,
            PermissionFilter::ReadOnly => granted
                .into_iter()
                .filter(|p| matches!(p, Permission::Read))
                .collect(),
        }
    }
}

/// Why and how a request is acting as a different principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpersonationContext {
    /// The admin actually driving the session.
    pub impersonating_admin: PrincipalId,
    /// When set, access is restricted to this container: resources anywhere
    /// else resolve to no permissions at all.
    pub restricted_container: Option<ContainerId>,
    pub filter: PermissionFilter,
    /// Roles granted by the impersonation itself, outside the assignment
    /// table.
    pub contextual_roles: Vec<Role>,
}

impl ImpersonationContext {
    pub fn full(impersonating_admin: PrincipalId) -> Self {
        Self {
            impersonating_admin,
            restricted_container: None,
            filter: PermissionFilter::Full,
            contextual_roles: Vec::new(),
        }
    }

    pub fn read_only(impersonating_admin: PrincipalId) -> Self {
        Self {
            impersonating_admin,
            restricted_container: None,
            filter: PermissionFilter::ReadOnly,
            contextual_roles: Vec::new(),
        }
    }

    pub fn restricted_to(mut self, container: ContainerId) -> Self {
        self.restricted_container = Some(container);
        self
    }

    pub fn with_contextual_roles(mut self, roles: Vec<Role>) -> Self {
        self.contextual_roles = roles;
        self
    }

    /// Whether resources in `container` are visible under this context.
    pub fn allows_container(&self, container: Option<ContainerId>) -> bool {
        match self.restricted_container {
            None => true,
            Some(allowed) => container == Some(allowed),
        }
    }
}

/// A user principal as seen by the resolution path.
///
/// The anonymous guest has id 0 and is implicitly a member of Guests only;
/// every other user is implicitly a member of both Guests and Users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: PrincipalId,
    pub name: String,
    pub active: bool,
    pub impersonation: Option<ImpersonationContext>,
}

impl User {
    pub fn new(id: PrincipalId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
            impersonation: None,
        }
    }

    pub fn guest() -> Self {
        Self::new(PrincipalId::GUEST_USER, "guest")
    }

    pub fn impersonated_by(mut self, context: ImpersonationContext) -> Self {
        self.impersonation = Some(context);
        self
    }

    pub fn is_guest(&self) -> bool {
        self.id == PrincipalId::GUEST_USER
    }

    pub fn is_impersonating(&self) -> bool {
        self.impersonation.is_some()
    }

    /// Roles granted outside the assignment table (impersonation-derived).
    pub fn contextual_roles(&self) -> Vec<Role> {
        self.impersonation
            .as_ref()
            .map(|ctx| ctx.contextual_roles.clone())
            .unwrap_or_default()
    }

    pub fn as_principal(&self) -> Principal {
        Principal {
            id: self.id,
            name: self.name.clone(),
            kind: PrincipalType::User,
            container: None,
            active: self.active,
        }
    }
}
