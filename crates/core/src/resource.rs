//! Securable-resource model.
//!
//! A securable resource is anything that can carry its own security policy:
//! a container (project or folder), or any domain object nested inside one.
//! Resources form a tree; a resource with no policy of its own defers to the
//! nearest ancestor with one (container-based inheritance).

use std::sync::Arc;

use crate::id::{ContainerId, ResourceId};

/// Anything that can carry a security policy.
///
/// Parents are reachable through the resource itself so the policy store can
/// walk the inheritance chain without knowing about the domain's tree shape.
pub trait SecurableResource: Send + Sync {
    /// Stable identifier of this resource.
    fn resource_id(&self) -> ResourceId;

    /// Container the resource lives in. `None` means the site root: the
    /// resource is site-wide rather than scoped to a project or folder.
    fn container_id(&self) -> Option<ContainerId>;

    /// Whether this resource defers to its parent when it has no policy of
    /// its own. Resources that must always carry an explicit policy return
    /// `false`.
    fn may_inherit_policy(&self) -> bool {
        true
    }

    /// Parent in the resource tree, if any.
    fn parent_resource(&self) -> Option<Arc<dyn SecurableResource>>;
}

/// Plain securable resource value.
///
/// Domain objects with richer structure can implement [`SecurableResource`]
/// directly; this type covers containers and simple nested resources.
#[derive(Clone)]
pub struct Resource {
    id: ResourceId,
    container: Option<ContainerId>,
    parent: Option<Arc<dyn SecurableResource>>,
    inherit: bool,
}

impl Resource {
    /// A site-wide resource (no container, no parent).
    pub fn site(id: ResourceId) -> Self {
        Self {
            id,
            container: None,
            parent: None,
            inherit: true,
        }
    }

    /// The securable resource of a container itself.
    pub fn container_root(container: ContainerId, parent: Option<Arc<dyn SecurableResource>>) -> Self {
        Self {
            id: container.as_resource_id(),
            container: Some(container),
            parent,
            inherit: true,
        }
    }

    /// A resource nested under a parent within a container.
    pub fn child_of(id: ResourceId, container: Option<ContainerId>, parent: Arc<dyn SecurableResource>) -> Self {
        Self {
            id,
            container,
            parent: Some(parent),
            inherit: true,
        }
    }

    /// Disable policy inheritance for this resource.
    pub fn without_inheritance(mut self) -> Self {
        self.inherit = false;
        self
    }
}

impl core::fmt::Debug for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("container", &self.container)
            .field("inherit", &self.inherit)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl SecurableResource for Resource {
    fn resource_id(&self) -> ResourceId {
        self.id
    }

    fn container_id(&self) -> Option<ContainerId> {
        self.container
    }

    fn may_inherit_policy(&self) -> bool {
        self.inherit
    }

    fn parent_resource(&self) -> Option<Arc<dyn SecurableResource>> {
        self.parent.clone()
    }
}
