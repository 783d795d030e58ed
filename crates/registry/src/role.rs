//! Role definitions.
//!
//! Each role is an immutable singleton identified by a stable name, granting
//! a fixed permission set. Some roles are non-assignable (granted only
//! contextually) and some are privileged (changing their assignments
//! requires elevated rights).

use serde::{Deserialize, Serialize};

use crate::permission::{Permission, PermissionSet};

/// A named bundle of permissions, assignable to a principal on a resource.
///
/// The variant order is the sort order of role assignments within a policy,
/// so it must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Marker role granting nothing. Used to pin an "explicitly no access"
    /// policy that would otherwise collapse into "inherit from parent".
    NoPermissions,
    Reader,
    Author,
    Editor,
    FolderAdmin,
    ProjectAdmin,
    SiteAdmin,
    /// Platform-developer capability; granted site-wide, never through a
    /// resource policy.
    Developer,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::NoPermissions,
        Role::Reader,
        Role::Author,
        Role::Editor,
        Role::FolderAdmin,
        Role::ProjectAdmin,
        Role::SiteAdmin,
        Role::Developer,
    ];

    /// Stable unique name (persisted in assignments and audit events).
    pub fn name(&self) -> &'static str {
        match self {
            Role::NoPermissions => "no-permissions",
            Role::Reader => "reader",
            Role::Author => "author",
            Role::Editor => "editor",
            Role::FolderAdmin => "folder-admin",
            Role::ProjectAdmin => "project-admin",
            Role::SiteAdmin => "site-admin",
            Role::Developer => "developer",
        }
    }

    pub fn by_name(name: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.name() == name)
    }

    /// The fixed permission set this role grants.
    pub fn permissions(&self) -> PermissionSet {
        let perms: &[Permission] = match self {
            Role::NoPermissions => &[],
            Role::Reader => &[Permission::Read],
            Role::Author => &[Permission::Read, Permission::Insert],
            Role::Editor => &[
                Permission::Read,
                Permission::Insert,
                Permission::Update,
                Permission::Delete,
            ],
            Role::FolderAdmin | Role::ProjectAdmin | Role::SiteAdmin => &Permission::ALL,
            // Developer gates script/code execution surfaces, not resource
            // CRUD; it grants no resource permissions here.
            Role::Developer => &[],
        };
        perms.iter().copied().collect()
    }

    /// Whether the role may appear in a resource policy at all.
    pub fn is_assignable(&self) -> bool {
        !matches!(self, Role::Developer)
    }

    /// Privileged roles require elevated rights to assign or revoke on
    /// site-scoped resources.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::SiteAdmin | Role::Developer)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::by_name(role.name()), Some(role));
        }
        assert_eq!(Role::by_name("nonsense"), None);
    }

    #[test]
    fn editor_grants_crud_but_not_admin() {
        let perms = Role::Editor.permissions();
        assert!(perms.contains(&Permission::Update));
        assert!(perms.contains(&Permission::Delete));
        assert!(!perms.contains(&Permission::Admin));
    }

    #[test]
    fn no_permissions_role_grants_nothing() {
        assert!(Role::NoPermissions.permissions().is_empty());
        assert!(Role::NoPermissions.is_assignable());
    }

    #[test]
    fn privileged_and_assignable_flags() {
        assert!(Role::SiteAdmin.is_privileged());
        assert!(Role::SiteAdmin.is_assignable());
        assert!(Role::Developer.is_privileged());
        assert!(!Role::Developer.is_assignable());
        assert!(!Role::Editor.is_privileged());
    }

    #[test]
    fn resolution_never_invents_permissions() {
        // Every permission a role grants is a registered marker.
        for role in Role::ALL {
            for p in role.permissions() {
                assert!(Permission::ALL.contains(&p));
            }
        }
    }
}
